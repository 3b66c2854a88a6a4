use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use expenseflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use expenseflow_core::budget::{self, BudgetBreach};
use expenseflow_core::domain::expense::{ExpenseId, ExpenseRecord};
use expenseflow_core::domain::site::{PeriodKey, SiteId};
use expenseflow_core::errors::{ApplicationError, WorkflowError};
use expenseflow_core::notify::{
    fan_out, Audience, NotificationDirective, EVENT_EXPENSE_UPDATED, EVENT_NEW_EXPENSE_SUBMITTED,
};
use expenseflow_core::workflow::{ActionRequest, ApprovalEngine, ApprovalStage, TransitionResult};
use expenseflow_db::repositories::{
    BudgetLedgerRepository, ExpenseRepository, RepositoryError, SiteRepository,
};

use crate::dispatch::NotificationTransport;

#[derive(Clone, Debug)]
pub struct NewExpense {
    pub amount: Decimal,
    pub site_id: SiteId,
    pub category: String,
    pub submitter_id: String,
}

/// What a committed action produced: the updated record, the transition
/// decision, and the directives that were handed to the transport.
#[derive(Clone, Debug)]
pub struct ActionOutcome {
    pub expense: ExpenseRecord,
    pub transition: TransitionResult,
    pub directives: Vec<NotificationDirective>,
}

/// Orchestrates one expense action end to end: load, decide, commit via
/// compare-and-swap, settle budget spend on payment, fan out notifications.
/// The decision itself lives in [`ApprovalEngine`]; this layer owns the
/// ordering and the failure boundaries around it.
pub struct ApprovalService<E, S, B, T> {
    engine: ApprovalEngine,
    expenses: Arc<E>,
    sites: Arc<S>,
    ledger: Arc<B>,
    transport: Arc<T>,
    audit: Arc<dyn AuditSink>,
}

impl<E, S, B, T> ApprovalService<E, S, B, T>
where
    E: ExpenseRepository,
    S: SiteRepository,
    B: BudgetLedgerRepository,
    T: NotificationTransport,
{
    pub fn new(
        expenses: Arc<E>,
        sites: Arc<S>,
        ledger: Arc<B>,
        transport: Arc<T>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { engine: ApprovalEngine::new(), expenses, sites, ledger, transport, audit }
    }

    /// Creates the record in `Submitted` and notifies the submitter plus the
    /// first-stage approver room.
    pub async fn submit_expense(
        &self,
        request: NewExpense,
    ) -> Result<ExpenseRecord, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();

        if request.amount <= Decimal::ZERO {
            return Err(WorkflowError::Validation(format!(
                "amount must be positive, got {}",
                request.amount
            ))
            .into());
        }

        // Categories are free-form at the edge; normalized once here so the
        // budget ledger and site limits agree on the key.
        let category = request.category.trim().to_ascii_lowercase();
        if category.is_empty() {
            return Err(WorkflowError::Validation("category must not be blank".to_owned()).into());
        }

        let site = self
            .sites
            .find_by_id(&request.site_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| {
                ApplicationError::Workflow(WorkflowError::NotFound(format!(
                    "site `{}`",
                    request.site_id.0
                )))
            })?;

        let record = ExpenseRecord::new(
            ExpenseId(format!("EXP-{}", Uuid::new_v4())),
            request.amount,
            site.id.clone(),
            site.name.clone(),
            category,
            request.submitter_id.clone(),
            Utc::now(),
        );
        self.expenses.insert(record.clone()).await.map_err(persistence)?;

        info!(
            event_name = "workflow.expense.submitted",
            correlation_id = %correlation_id,
            expense_id = %record.id.0,
            site_id = %record.site_id.0,
            "expense submitted"
        );

        let payload = serde_json::json!({
            "expense_id": record.id.0,
            "status": record.status,
            "amount": record.current_amount.to_string(),
            "site_name": record.site_name,
            "category": record.category,
            "submitter_id": record.submitter_id,
        });
        let directives = vec![
            NotificationDirective {
                audience: Audience::User { user_id: record.submitter_id.clone() },
                event_type: EVENT_EXPENSE_UPDATED.to_owned(),
                payload: payload.clone(),
            },
            NotificationDirective {
                audience: Audience::role_room(ApprovalStage::L1),
                event_type: EVENT_NEW_EXPENSE_SUBMITTED.to_owned(),
                payload,
            },
        ];
        self.dispatch(&directives, &correlation_id).await;

        self.audit.emit(
            AuditEvent::new(
                Some(record.id.clone()),
                correlation_id,
                "workflow.expense.submitted",
                AuditCategory::Workflow,
                record.submitter_id.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("amount", record.current_amount.to_string())
            .with_metadata("site_id", record.site_id.0.clone()),
        );

        Ok(record)
    }

    /// Applies one approval action. The engine decides; the commit is a
    /// compare-and-swap on the loaded status, so a concurrent writer that
    /// got there first surfaces as `InvalidState` rather than a double
    /// transition. Budget settlement and notification dispatch happen after
    /// the commit and never undo it.
    pub async fn process_action(
        &self,
        expense_id: &ExpenseId,
        request: ActionRequest,
    ) -> Result<ActionOutcome, ApplicationError> {
        let correlation_id = Uuid::new_v4().to_string();

        let record = self
            .expenses
            .find_by_id(expense_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| {
                ApplicationError::Workflow(WorkflowError::NotFound(format!(
                    "expense `{}`",
                    expense_id.0
                )))
            })?;

        let (updated, transition) =
            self.engine.submit_approval_action(&record, &request, Utc::now())?;

        let committed = self
            .expenses
            .compare_and_swap_status(record.status, &updated)
            .await
            .map_err(persistence)?;
        if !committed {
            let current = self
                .expenses
                .find_by_id(expense_id)
                .await
                .map_err(persistence)?
                .map(|reloaded| reloaded.status)
                .unwrap_or(record.status);
            self.emit_action_audit(&transition, &request, AuditOutcome::Failed, &correlation_id);
            return Err(WorkflowError::InvalidState { status: current }.into());
        }

        info!(
            event_name = "workflow.expense.transition",
            correlation_id = %correlation_id,
            expense_id = %transition.expense_id.0,
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            level = transition.level,
            "approval action committed"
        );

        let breaches = if transition.terminal_approval {
            self.settle_budget(&transition, &correlation_id).await
        } else {
            Vec::new()
        };

        let directives = fan_out(&transition, &breaches);
        self.dispatch(&directives, &correlation_id).await;

        let outcome =
            if transition.rejected { AuditOutcome::Rejected } else { AuditOutcome::Success };
        self.emit_action_audit(&transition, &request, outcome, &correlation_id);

        Ok(ActionOutcome { expense: updated, transition, directives })
    }

    /// Records the paid amount in the spend ledger and computes threshold
    /// breaches. Keyed on the approval event id, so a crash/retry replay of
    /// an already-settled payment adds nothing and alerts nobody. Ledger
    /// failures are logged and swallowed: the transition is already
    /// committed and must not be reported as failed.
    async fn settle_budget(
        &self,
        transition: &TransitionResult,
        correlation_id: &str,
    ) -> Vec<BudgetBreach> {
        // Keyed to the paying event's timestamp, not the settlement clock:
        // a retry that crosses a month boundary lands in the same period.
        let period = PeriodKey::from_date(transition.occurred_at);

        let newly_applied = match self
            .ledger
            .apply_spend(
                &transition.event_id,
                &transition.site_id,
                &transition.category,
                period,
                transition.effective_amount,
            )
            .await
        {
            Ok(applied) => applied,
            Err(error) => {
                warn!(
                    event_name = "budget.ledger.apply_failed",
                    correlation_id = %correlation_id,
                    expense_id = %transition.expense_id.0,
                    error = %error,
                    "spend was not recorded; transition stands"
                );
                return Vec::new();
            }
        };
        if !newly_applied {
            return Vec::new();
        }

        let site = match self.sites.find_by_id(&transition.site_id).await {
            Ok(Some(site)) => site,
            Ok(None) => {
                warn!(
                    event_name = "budget.site_missing",
                    correlation_id = %correlation_id,
                    expense_id = %transition.expense_id.0,
                    site_id = %transition.site_id.0,
                    "no budget config for site; skipping breach evaluation"
                );
                return Vec::new();
            }
            Err(error) => {
                warn!(
                    event_name = "budget.site_lookup_failed",
                    correlation_id = %correlation_id,
                    expense_id = %transition.expense_id.0,
                    error = %error,
                    "skipping breach evaluation"
                );
                return Vec::new();
            }
        };

        let snapshot = match self
            .ledger
            .snapshot(&transition.site_id, &transition.category, period)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(
                    event_name = "budget.snapshot_failed",
                    correlation_id = %correlation_id,
                    expense_id = %transition.expense_id.0,
                    error = %error,
                    "skipping breach evaluation"
                );
                return Vec::new();
            }
        };

        let breaches = budget::evaluate(
            &transition.site_id,
            &transition.category,
            &site.budget,
            period,
            &snapshot,
        );
        for breach in &breaches {
            self.audit.emit(
                AuditEvent::new(
                    Some(transition.expense_id.clone()),
                    correlation_id,
                    "budget.threshold_breached",
                    AuditCategory::Budget,
                    "system",
                    AuditOutcome::Success,
                )
                .with_metadata("scope", format!("{:?}", breach.scope))
                .with_metadata("period", breach.period.clone())
                .with_metadata("utilization_percent", breach.utilization_percent.to_string()),
            );
        }
        breaches
    }

    // Fire and forget: a transport failure is logged and the remaining
    // directives still go out.
    async fn dispatch(&self, directives: &[NotificationDirective], correlation_id: &str) {
        for directive in directives {
            if let Err(error) = self.transport.deliver(directive).await {
                warn!(
                    event_name = "notify.delivery_failed",
                    correlation_id = %correlation_id,
                    channel = %directive.audience.channel(),
                    event_type = %directive.event_type,
                    error = %error,
                    "notification dropped"
                );
            }
        }
    }

    fn emit_action_audit(
        &self,
        transition: &TransitionResult,
        request: &ActionRequest,
        outcome: AuditOutcome,
        correlation_id: &str,
    ) {
        self.audit.emit(
            AuditEvent::new(
                Some(transition.expense_id.clone()),
                correlation_id,
                format!("workflow.expense.{}", transition.to.as_str()),
                AuditCategory::Workflow,
                request.approver_id.clone(),
                outcome,
            )
            .with_metadata("from", transition.from.as_str())
            .with_metadata("to", transition.to.as_str())
            .with_metadata("level", transition.level.to_string())
            .with_metadata("amount", transition.effective_amount.to_string()),
        );
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use expenseflow_core::audit::InMemoryAuditSink;
    use expenseflow_core::domain::expense::{ApprovalAction, ExpenseId, ExpenseStatus};
    use expenseflow_core::domain::site::{BudgetConfig, PeriodKey, Site, SiteId};
    use expenseflow_core::errors::{ApplicationError, WorkflowError};
    use expenseflow_core::notify::{
        Audience, NotificationDirective, EVENT_BUDGET_EXCEEDED_ALERT,
        EVENT_EXPENSE_PAYMENT_PROCESSED, EVENT_NEW_EXPENSE_SUBMITTED,
    };
    use expenseflow_core::workflow::{ActionRequest, ApproverRole};
    use expenseflow_db::repositories::{
        BudgetLedgerRepository, InMemoryBudgetLedgerRepository, InMemoryExpenseRepository,
        InMemorySiteRepository, SiteRepository,
    };

    use crate::dispatch::{InMemoryTransport, NotificationTransport, TransportError};

    use super::{ApprovalService, NewExpense};

    type TestService<T = InMemoryTransport> = ApprovalService<
        InMemoryExpenseRepository,
        InMemorySiteRepository,
        InMemoryBudgetLedgerRepository,
        T,
    >;

    struct Fixture {
        service: TestService,
        transport: Arc<InMemoryTransport>,
        ledger: Arc<InMemoryBudgetLedgerRepository>,
        audit: InMemoryAuditSink,
    }

    async fn fixture_with_budget(budget: BudgetConfig) -> Fixture {
        let expenses = Arc::new(InMemoryExpenseRepository::default());
        let sites = Arc::new(InMemorySiteRepository::default());
        let ledger = Arc::new(InMemoryBudgetLedgerRepository::default());
        let transport = Arc::new(InMemoryTransport::default());
        let audit = InMemoryAuditSink::default();

        sites
            .save(Site {
                id: SiteId("site-hq".to_owned()),
                name: "Headquarters".to_owned(),
                budget,
            })
            .await
            .expect("seed site");

        let service = ApprovalService::new(
            expenses,
            sites,
            Arc::clone(&ledger),
            Arc::clone(&transport),
            Arc::new(audit.clone()),
        );
        Fixture { service, transport, ledger, audit }
    }

    async fn fixture() -> Fixture {
        fixture_with_budget(BudgetConfig::default()).await
    }

    fn approve(role: ApproverRole, level: u8) -> ActionRequest {
        ActionRequest {
            approver_id: format!("u-approver-l{level}"),
            actor_role: role,
            action: ApprovalAction::Approved,
            level,
            comment: "looks good".to_owned(),
            modified_amount: None,
            modification_reason: None,
        }
    }

    fn new_expense(amount: Decimal) -> NewExpense {
        NewExpense {
            amount,
            site_id: SiteId("site-hq".to_owned()),
            category: "Travel".to_owned(),
            submitter_id: "u-submitter".to_owned(),
        }
    }

    async fn drive_to_paid(fixture: &Fixture, expense_id: &ExpenseId) {
        for (role, level) in [
            (ApproverRole::L1Approver, 1),
            (ApproverRole::L2Approver, 2),
            (ApproverRole::L3Approver, 3),
            (ApproverRole::Finance, 4),
        ] {
            fixture
                .service
                .process_action(expense_id, approve(role, level))
                .await
                .expect("approval should apply");
        }
    }

    #[tokio::test]
    async fn submission_creates_record_and_notifies_the_l1_room() {
        let fixture = fixture().await;

        let record = fixture
            .service
            .submit_expense(new_expense(Decimal::new(5000, 0)))
            .await
            .expect("submit");

        assert_eq!(record.status, ExpenseStatus::Submitted);
        assert_eq!(record.category, "travel");
        assert_eq!(record.site_name, "Headquarters");

        let delivered = fixture.transport.delivered();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[1].event_type, EVENT_NEW_EXPENSE_SUBMITTED);
        assert_eq!(delivered[1].audience.channel(), "role-l1_approver");
    }

    #[tokio::test]
    async fn submission_rejects_non_positive_amounts_and_unknown_sites() {
        let fixture = fixture().await;

        let zero = fixture.service.submit_expense(new_expense(Decimal::ZERO)).await;
        assert!(matches!(
            zero,
            Err(ApplicationError::Workflow(WorkflowError::Validation(_)))
        ));

        let mut orphan = new_expense(Decimal::new(5000, 0));
        orphan.site_id = SiteId("site-missing".to_owned());
        let missing = fixture.service.submit_expense(orphan).await;
        assert!(matches!(
            missing,
            Err(ApplicationError::Workflow(WorkflowError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn full_chain_reaches_paid_and_settles_the_ledger() {
        let fixture = fixture().await;
        let record = fixture
            .service
            .submit_expense(new_expense(Decimal::new(5000, 0)))
            .await
            .expect("submit");

        drive_to_paid(&fixture, &record.id).await;

        let delivered = fixture.transport.delivered();
        let paid_count = delivered
            .iter()
            .filter(|directive| directive.event_type == EVENT_EXPENSE_PAYMENT_PROCESSED)
            .count();
        assert_eq!(paid_count, 1);

        let snapshot = fixture
            .ledger
            .snapshot(
                &SiteId("site-hq".to_owned()),
                "travel",
                PeriodKey::from_date(chrono::Utc::now()),
            )
            .await
            .expect("snapshot");
        assert_eq!(snapshot.site_month_total, Decimal::new(5000, 0));
        assert_eq!(snapshot.category_month_total, Decimal::new(5000, 0));

        let audited: Vec<String> =
            fixture.audit.events().iter().map(|event| event.event_type.clone()).collect();
        assert!(audited.contains(&"workflow.expense.paid".to_owned()));
    }

    #[tokio::test]
    async fn unknown_expense_propagates_not_found() {
        let fixture = fixture().await;

        let result = fixture
            .service
            .process_action(&ExpenseId("EXP-404".to_owned()), approve(ApproverRole::L1Approver, 1))
            .await;

        assert!(matches!(
            result,
            Err(ApplicationError::Workflow(WorkflowError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn racing_approvers_produce_exactly_one_committed_transition() {
        let fixture = fixture().await;
        let record = fixture
            .service
            .submit_expense(new_expense(Decimal::new(5000, 0)))
            .await
            .expect("submit");

        let service = Arc::new(fixture.service);
        let mut handles = Vec::new();
        for _ in 0..2 {
            let service = Arc::clone(&service);
            let expense_id = record.id.clone();
            handles.push(tokio::spawn(async move {
                service.process_action(&expense_id, approve(ApproverRole::L1Approver, 1)).await
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.expect("task").is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1, "exactly one concurrent approver may win");
    }

    #[tokio::test]
    async fn acting_on_a_paid_expense_is_invalid_state() {
        let fixture = fixture().await;
        let record = fixture
            .service
            .submit_expense(new_expense(Decimal::new(5000, 0)))
            .await
            .expect("submit");
        drive_to_paid(&fixture, &record.id).await;

        let result =
            fixture.service.process_action(&record.id, approve(ApproverRole::Finance, 4)).await;

        assert!(matches!(
            result,
            Err(ApplicationError::Workflow(WorkflowError::InvalidState { .. }))
        ));
    }

    #[tokio::test]
    async fn modified_amount_flows_through_to_the_paid_settlement() {
        let fixture = fixture().await;
        let record = fixture
            .service
            .submit_expense(new_expense(Decimal::new(5000, 0)))
            .await
            .expect("submit");

        fixture
            .service
            .process_action(&record.id, approve(ApproverRole::L1Approver, 1))
            .await
            .expect("l1");
        let mut trimmed = approve(ApproverRole::L2Approver, 2);
        trimmed.modified_amount = Some(Decimal::new(4200, 0));
        trimmed.modification_reason = Some("above travel policy cap".to_owned());
        fixture.service.process_action(&record.id, trimmed).await.expect("l2");
        fixture
            .service
            .process_action(&record.id, approve(ApproverRole::L3Approver, 3))
            .await
            .expect("l3");
        let outcome = fixture
            .service
            .process_action(&record.id, approve(ApproverRole::Finance, 4))
            .await
            .expect("finance");

        assert_eq!(outcome.transition.effective_amount, Decimal::new(4200, 0));
        let snapshot = fixture
            .ledger
            .snapshot(
                &SiteId("site-hq".to_owned()),
                "travel",
                PeriodKey::from_date(chrono::Utc::now()),
            )
            .await
            .expect("snapshot");
        assert_eq!(snapshot.site_month_total, Decimal::new(4200, 0));
    }

    #[tokio::test]
    async fn payment_over_a_low_limit_raises_a_budget_alert() {
        let fixture = fixture_with_budget(BudgetConfig {
            monthly_limit: Some(Decimal::new(6000, 0)),
            yearly_limit: None,
            category_limits: BTreeMap::new(),
            alert_threshold_percent: 80,
        })
        .await;
        let record = fixture
            .service
            .submit_expense(new_expense(Decimal::new(5000, 0)))
            .await
            .expect("submit");

        drive_to_paid(&fixture, &record.id).await;

        let alerts: Vec<NotificationDirective> = fixture
            .transport
            .delivered()
            .into_iter()
            .filter(|directive| directive.event_type == EVENT_BUDGET_EXCEEDED_ALERT)
            .collect();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].audience, Audience::Room { name: "budget-alerts".to_owned() });
        assert_eq!(alerts[0].payload["utilization_percent"], 83);
    }

    #[tokio::test]
    async fn mixed_case_category_limit_still_matches_the_normalized_expense() {
        let fixture = fixture_with_budget(BudgetConfig {
            monthly_limit: None,
            yearly_limit: None,
            category_limits: BTreeMap::from([("Travel".to_owned(), Decimal::new(5000, 0))]),
            alert_threshold_percent: 80,
        })
        .await;
        let record = fixture
            .service
            .submit_expense(new_expense(Decimal::new(4500, 0)))
            .await
            .expect("submit");

        drive_to_paid(&fixture, &record.id).await;

        let alerts: Vec<NotificationDirective> = fixture
            .transport
            .delivered()
            .into_iter()
            .filter(|directive| directive.event_type == EVENT_BUDGET_EXCEEDED_ALERT)
            .collect();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].payload["category"], "travel");
        assert_eq!(alerts[0].payload["utilization_percent"], 90);
    }

    struct FailingTransport;

    #[async_trait]
    impl NotificationTransport for FailingTransport {
        async fn deliver(
            &self,
            directive: &NotificationDirective,
        ) -> Result<(), TransportError> {
            Err(TransportError::Delivery {
                channel: directive.audience.channel(),
                reason: "gateway offline".to_owned(),
            })
        }
    }

    #[tokio::test]
    async fn transport_failures_never_fail_the_committed_action() {
        let expenses = Arc::new(InMemoryExpenseRepository::default());
        let sites = Arc::new(InMemorySiteRepository::default());
        sites
            .save(Site {
                id: SiteId("site-hq".to_owned()),
                name: "Headquarters".to_owned(),
                budget: BudgetConfig::default(),
            })
            .await
            .expect("seed site");
        let service: TestService<FailingTransport> = ApprovalService::new(
            expenses,
            sites,
            Arc::new(InMemoryBudgetLedgerRepository::default()),
            Arc::new(FailingTransport),
            Arc::new(InMemoryAuditSink::default()),
        );

        let record =
            service.submit_expense(new_expense(Decimal::new(5000, 0))).await.expect("submit");
        let outcome = service
            .process_action(&record.id, approve(ApproverRole::L1Approver, 1))
            .await
            .expect("approval must commit even when delivery fails");

        assert_eq!(outcome.expense.status, ExpenseStatus::ApprovedL1);
    }
}
