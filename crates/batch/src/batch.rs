use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use foodtrust_auth::{Permission, Principal, Role, authorize, ensure_owner_or_regulator};
use foodtrust_core::{ActorId, Aggregate, AggregateRoot, BatchId, DomainError, OrganizationId};
use foodtrust_events::{Command, Event, EventKind};

use crate::fields::{
    BatchChanges, FarmLocation, Logistics, NewBatch, Processing, Quality, Quantity, Retail,
    StepDetails,
};
use crate::{BatchStatus, LifecycleStep};

/// Recall sub-record. Once present the batch is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallInfo {
    pub is_recalled: bool,
    pub reason: String,
    pub recall_date: DateTime<Utc>,
    pub affected_batches: Vec<BatchId>,
}

/// Aggregate root: Batch.
///
/// Never mutated outside `apply`; a snapshot is always `fold(events)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    batch_id: BatchId,
    crop: String,
    variety: Option<String>,
    harvest_date: Option<NaiveDate>,
    farm_location: Option<FarmLocation>,
    quantity: Option<Quantity>,
    quality: Quality,
    processing: Option<Processing>,
    logistics: Option<Logistics>,
    retail: Option<Retail>,
    current_owner: Option<OrganizationId>,
    current_owner_role: Option<Role>,
    status: BatchStatus,
    recall: Option<RecallInfo>,
    created_by: Option<ActorId>,
    created_at: Option<DateTime<Utc>>,
    last_updated: Option<DateTime<Utc>>,
    version: u64,
}

impl Batch {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(batch_id: BatchId) -> Self {
        Self {
            batch_id,
            crop: String::new(),
            variety: None,
            harvest_date: None,
            farm_location: None,
            quantity: None,
            quality: Quality::default(),
            processing: None,
            logistics: None,
            retail: None,
            current_owner: None,
            current_owner_role: None,
            status: BatchStatus::Created,
            recall: None,
            created_by: None,
            created_at: None,
            last_updated: None,
            version: 0,
        }
    }

    pub fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    /// Whether a `CREATE` event has been folded in.
    pub fn exists(&self) -> bool {
        self.created_at.is_some()
    }

    pub fn crop(&self) -> &str {
        &self.crop
    }

    pub fn variety(&self) -> Option<&str> {
        self.variety.as_deref()
    }

    pub fn harvest_date(&self) -> Option<NaiveDate> {
        self.harvest_date
    }

    pub fn farm_location(&self) -> Option<&FarmLocation> {
        self.farm_location.as_ref()
    }

    pub fn quantity(&self) -> Option<&Quantity> {
        self.quantity.as_ref()
    }

    pub fn quality(&self) -> &Quality {
        &self.quality
    }

    pub fn processing(&self) -> Option<&Processing> {
        self.processing.as_ref()
    }

    pub fn logistics(&self) -> Option<&Logistics> {
        self.logistics.as_ref()
    }

    pub fn retail(&self) -> Option<&Retail> {
        self.retail.as_ref()
    }

    pub fn current_owner(&self) -> Option<&OrganizationId> {
        self.current_owner.as_ref()
    }

    pub fn current_owner_role(&self) -> Option<Role> {
        self.current_owner_role
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn recall(&self) -> Option<&RecallInfo> {
        self.recall.as_ref()
    }

    /// Recalled either through the recall engine or a direct status update.
    pub fn is_recalled(&self) -> bool {
        self.status == BatchStatus::Recalled || self.recall.as_ref().is_some_and(|r| r.is_recalled)
    }

    pub fn created_by(&self) -> Option<&ActorId> {
        self.created_by.as_ref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if self.exists() {
            Ok(())
        } else {
            Err(DomainError::not_found(format!("batch {}", self.batch_id)))
        }
    }

    fn ensure_target(&self, target: &BatchId) -> Result<(), DomainError> {
        if target == &self.batch_id {
            Ok(())
        } else {
            Err(DomainError::validation(
                "batchId",
                format!("command targets {target}, aggregate is {}", self.batch_id),
            ))
        }
    }

    /// Role permission plus current-ownership check.
    fn ensure_may_mutate(&self, principal: &Principal, permission: Permission) -> Result<(), DomainError> {
        authorize(principal, permission)?;
        let owner = self
            .current_owner
            .as_ref()
            .ok_or_else(|| DomainError::not_found(format!("owner of batch {}", self.batch_id)))?;
        ensure_owner_or_regulator(principal, owner)?;
        Ok(())
    }
}

impl AggregateRoot for Batch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.batch_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateBatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateBatch {
    pub batch_id: BatchId,
    pub principal: Principal,
    pub fields: NewBatch,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateBatch (partial mutable facts, optionally a status change).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateBatch {
    pub batch_id: BatchId,
    pub principal: Principal,
    pub changes: BatchChanges,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TransferOwnership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOwnership {
    pub batch_id: BatchId,
    pub principal: Principal,
    pub new_owner: OrganizationId,
    pub new_owner_role: Role,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordLifecycleStep (process, package, ship, receive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordLifecycleStep {
    pub batch_id: BatchId,
    pub principal: Principal,
    pub step: LifecycleStep,
    pub details: StepDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecallBatch. Issued once per affected batch by the recall engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallBatch {
    pub batch_id: BatchId,
    pub principal: Principal,
    pub reason: String,
    pub recall_date: DateTime<Utc>,
    pub affected_batches: Vec<BatchId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BatchCommand {
    CreateBatch(CreateBatch),
    UpdateBatch(UpdateBatch),
    TransferOwnership(TransferOwnership),
    RecordLifecycleStep(RecordLifecycleStep),
    RecallBatch(RecallBatch),
}

impl Command for BatchCommand {
    fn target_batch_id(&self) -> &BatchId {
        match self {
            BatchCommand::CreateBatch(c) => &c.batch_id,
            BatchCommand::UpdateBatch(c) => &c.batch_id,
            BatchCommand::TransferOwnership(c) => &c.batch_id,
            BatchCommand::RecordLifecycleStep(c) => &c.batch_id,
            BatchCommand::RecallBatch(c) => &c.batch_id,
        }
    }
}

impl BatchCommand {
    pub fn principal(&self) -> &Principal {
        match self {
            BatchCommand::CreateBatch(c) => &c.principal,
            BatchCommand::UpdateBatch(c) => &c.principal,
            BatchCommand::TransferOwnership(c) => &c.principal,
            BatchCommand::RecordLifecycleStep(c) => &c.principal,
            BatchCommand::RecallBatch(c) => &c.principal,
        }
    }
}

/// Event: BatchCreated (`CREATE`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCreated {
    pub batch_id: BatchId,
    pub actor: ActorId,
    pub crop: String,
    pub variety: Option<String>,
    pub harvest_date: NaiveDate,
    pub farm_location: FarmLocation,
    pub quantity: Quantity,
    pub quality: Quality,
    pub owner: OrganizationId,
    pub owner_role: Role,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchUpdated (`UPDATE`), carrying only the submitted sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchUpdated {
    pub batch_id: BatchId,
    pub actor: ActorId,
    pub changes: BatchChanges,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OwnershipTransferred (`TRANSFER`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipTransferred {
    pub batch_id: BatchId,
    pub actor: ActorId,
    pub previous_owner: OrganizationId,
    pub previous_owner_role: Role,
    pub new_owner: OrganizationId,
    pub new_owner_role: Role,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LifecycleStepRecorded (`PROCESS` / `PACKAGE` / `SHIP` / `RECEIVE`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleStepRecorded {
    pub batch_id: BatchId,
    pub actor: ActorId,
    pub step: LifecycleStep,
    pub previous_status: BatchStatus,
    pub details: StepDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchRecalled (`RECALL`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecalled {
    pub batch_id: BatchId,
    pub actor: ActorId,
    pub reason: String,
    pub recall_date: DateTime<Utc>,
    pub affected_batches: Vec<BatchId>,
    pub previous_status: BatchStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BatchEvent {
    BatchCreated(BatchCreated),
    BatchUpdated(BatchUpdated),
    OwnershipTransferred(OwnershipTransferred),
    LifecycleStepRecorded(LifecycleStepRecorded),
    BatchRecalled(BatchRecalled),
}

impl BatchEvent {
    pub fn batch_id(&self) -> &BatchId {
        match self {
            BatchEvent::BatchCreated(e) => &e.batch_id,
            BatchEvent::BatchUpdated(e) => &e.batch_id,
            BatchEvent::OwnershipTransferred(e) => &e.batch_id,
            BatchEvent::LifecycleStepRecorded(e) => &e.batch_id,
            BatchEvent::BatchRecalled(e) => &e.batch_id,
        }
    }
}

impl Event for BatchEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BatchEvent::BatchCreated(_) => "batch.created",
            BatchEvent::BatchUpdated(_) => "batch.updated",
            BatchEvent::OwnershipTransferred(_) => "batch.ownership_transferred",
            BatchEvent::LifecycleStepRecorded(_) => "batch.lifecycle_step_recorded",
            BatchEvent::BatchRecalled(_) => "batch.recalled",
        }
    }

    fn kind(&self) -> EventKind {
        match self {
            BatchEvent::BatchCreated(_) => EventKind::Create,
            BatchEvent::BatchUpdated(_) => EventKind::Update,
            BatchEvent::OwnershipTransferred(_) => EventKind::Transfer,
            BatchEvent::LifecycleStepRecorded(e) => e.step.kind(),
            BatchEvent::BatchRecalled(_) => EventKind::Recall,
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn actor(&self) -> &ActorId {
        match self {
            BatchEvent::BatchCreated(e) => &e.actor,
            BatchEvent::BatchUpdated(e) => &e.actor,
            BatchEvent::OwnershipTransferred(e) => &e.actor,
            BatchEvent::LifecycleStepRecorded(e) => &e.actor,
            BatchEvent::BatchRecalled(e) => &e.actor,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BatchEvent::BatchCreated(e) => e.occurred_at,
            BatchEvent::BatchUpdated(e) => e.occurred_at,
            BatchEvent::OwnershipTransferred(e) => e.occurred_at,
            BatchEvent::LifecycleStepRecorded(e) => e.occurred_at,
            BatchEvent::BatchRecalled(e) => e.occurred_at,
        }
    }
}

/// Derive a snapshot by replaying events, in sequence order, into an empty batch.
pub fn fold<'a>(batch_id: BatchId, events: impl IntoIterator<Item = &'a BatchEvent>) -> Batch {
    let mut batch = Batch::empty(batch_id);
    for event in events {
        batch.apply(event);
    }
    batch
}

impl Aggregate for Batch {
    type Command = BatchCommand;
    type Event = BatchEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BatchEvent::BatchCreated(e) => {
                self.crop = e.crop.clone();
                self.variety = e.variety.clone();
                self.harvest_date = Some(e.harvest_date);
                self.farm_location = Some(e.farm_location.clone());
                self.quantity = Some(e.quantity.clone());
                self.quality = e.quality.clone();
                self.current_owner = Some(e.owner.clone());
                self.current_owner_role = Some(e.owner_role);
                self.status = BatchStatus::Created;
                self.created_by = Some(e.actor.clone());
                self.created_at = Some(e.occurred_at);
            }
            BatchEvent::BatchUpdated(e) => {
                let changes = &e.changes;
                if let Some(status) = changes.status {
                    self.status = status;
                }
                if let Some(quantity) = &changes.quantity {
                    self.quantity = Some(quantity.clone());
                }
                if let Some(quality) = &changes.quality {
                    self.quality = quality.clone();
                }
                if let Some(processing) = &changes.processing {
                    self.processing = Some(processing.clone());
                }
                if let Some(logistics) = &changes.logistics {
                    self.logistics = Some(logistics.clone());
                }
                if let Some(retail) = &changes.retail {
                    self.retail = Some(retail.clone());
                }
            }
            BatchEvent::OwnershipTransferred(e) => {
                self.current_owner = Some(e.new_owner.clone());
                self.current_owner_role = Some(e.new_owner_role);
            }
            BatchEvent::LifecycleStepRecorded(e) => {
                self.status = e.step.target_status();
                let details = &e.details;
                if let Some(processing) = &details.processing {
                    self.processing = Some(processing.clone());
                }
                if let Some(packaging) = &details.packaging {
                    self.processing.get_or_insert_with(Processing::default).packaging =
                        Some(packaging.clone());
                }
                if let Some(logistics) = &details.logistics {
                    self.logistics = Some(logistics.clone());
                }
                if let Some(retail) = &details.retail {
                    self.retail = Some(retail.clone());
                }
            }
            BatchEvent::BatchRecalled(e) => {
                self.status = BatchStatus::Recalled;
                self.recall = Some(RecallInfo {
                    is_recalled: true,
                    reason: e.reason.clone(),
                    recall_date: e.recall_date,
                    affected_batches: e.affected_batches.clone(),
                });
            }
        }

        self.last_updated = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        self.ensure_target(command.target_batch_id())?;

        match command {
            BatchCommand::CreateBatch(cmd) => self.handle_create(cmd),
            BatchCommand::UpdateBatch(cmd) => self.handle_update(cmd),
            BatchCommand::TransferOwnership(cmd) => self.handle_transfer(cmd),
            BatchCommand::RecordLifecycleStep(cmd) => self.handle_lifecycle_step(cmd),
            BatchCommand::RecallBatch(cmd) => self.handle_recall(cmd),
        }
    }
}

impl Batch {
    fn handle_create(&self, cmd: &CreateBatch) -> Result<Vec<BatchEvent>, DomainError> {
        if self.exists() {
            return Err(DomainError::conflict(format!("batch {} already exists", self.batch_id)));
        }

        authorize(&cmd.principal, Permission::BatchCreate)?;
        if !cmd.principal.role.can_own_batches() {
            return Err(DomainError::unauthorized(format!(
                "role '{}' cannot own batches",
                cmd.principal.role
            )));
        }

        let fields = &cmd.fields;
        let crop = fields.crop.trim();
        if crop.is_empty() {
            return Err(DomainError::validation("crop", "is required"));
        }
        let Some(harvest_date) = fields.harvest_date else {
            return Err(DomainError::validation("harvestDate", "is required"));
        };
        let Some(farm_location) = fields.farm_location.clone() else {
            return Err(DomainError::validation("farmLocation", "is required"));
        };
        farm_location.validate()?;
        let Some(quantity) = fields.quantity.clone() else {
            return Err(DomainError::validation("quantity", "is required"));
        };
        quantity.validate()?;

        let variety = fields
            .variety
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        Ok(vec![BatchEvent::BatchCreated(BatchCreated {
            batch_id: cmd.batch_id.clone(),
            actor: cmd.principal.actor_id.clone(),
            crop: crop.to_string(),
            variety,
            harvest_date,
            farm_location,
            quantity,
            quality: fields.quality.clone().unwrap_or_default(),
            owner: cmd.principal.organization.clone(),
            owner_role: cmd.principal.role,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateBatch) -> Result<Vec<BatchEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_may_mutate(&cmd.principal, Permission::BatchUpdate)?;
        cmd.changes.validate()?;

        if let Some(status) = cmd.changes.status {
            self.status.check_transition(status, "update")?;
        }

        Ok(vec![BatchEvent::BatchUpdated(BatchUpdated {
            batch_id: cmd.batch_id.clone(),
            actor: cmd.principal.actor_id.clone(),
            changes: cmd.changes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transfer(&self, cmd: &TransferOwnership) -> Result<Vec<BatchEvent>, DomainError> {
        self.ensure_exists()?;

        if self.status.is_terminal() {
            return Err(DomainError::terminal_state(self.status, "transfer"));
        }

        self.ensure_may_mutate(&cmd.principal, Permission::BatchTransfer)?;

        if !cmd.new_owner_role.can_own_batches() {
            return Err(DomainError::validation(
                "newOwnerRole",
                format!("role '{}' cannot own batches", cmd.new_owner_role),
            ));
        }

        let (Some(previous_owner), Some(previous_owner_role)) =
            (self.current_owner.clone(), self.current_owner_role)
        else {
            return Err(DomainError::not_found(format!("owner of batch {}", self.batch_id)));
        };

        Ok(vec![BatchEvent::OwnershipTransferred(OwnershipTransferred {
            batch_id: cmd.batch_id.clone(),
            actor: cmd.principal.actor_id.clone(),
            previous_owner,
            previous_owner_role,
            new_owner: cmd.new_owner.clone(),
            new_owner_role: cmd.new_owner_role,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_lifecycle_step(&self, cmd: &RecordLifecycleStep) -> Result<Vec<BatchEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_may_mutate(&cmd.principal, Permission::BatchUpdate)?;
        cmd.details.validate()?;
        self.status
            .check_transition(cmd.step.target_status(), cmd.step.as_str())?;

        Ok(vec![BatchEvent::LifecycleStepRecorded(LifecycleStepRecorded {
            batch_id: cmd.batch_id.clone(),
            actor: cmd.principal.actor_id.clone(),
            step: cmd.step,
            previous_status: self.status,
            details: cmd.details.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    /// Recall bypasses the transition graph; it is legal from every status and
    /// repeated recalls are recorded again.
    fn handle_recall(&self, cmd: &RecallBatch) -> Result<Vec<BatchEvent>, DomainError> {
        self.ensure_exists()?;
        authorize(&cmd.principal, Permission::RecallInitiate)?;

        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("reason", "is required"));
        }

        Ok(vec![BatchEvent::BatchRecalled(BatchRecalled {
            batch_id: cmd.batch_id.clone(),
            actor: cmd.principal.actor_id.clone(),
            reason: reason.to_string(),
            recall_date: cmd.recall_date,
            affected_batches: cmd.affected_batches.clone(),
            previous_status: self.status,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::QuantityUnit;
    use proptest::prelude::*;

    fn test_batch_id() -> BatchId {
        BatchId::parse("BATCH_1705276800000_a1b2c3d4e").unwrap()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn principal(actor: &str, org: &str, role: Role) -> Principal {
        Principal::new(
            ActorId::parse(actor).unwrap(),
            OrganizationId::parse(org).unwrap(),
            role,
        )
    }

    fn alice() -> Principal {
        principal("alice", "GreenValley", Role::Farmer)
    }

    fn regulator() -> Principal {
        principal("rita", "FoodAgency", Role::Regulator)
    }

    fn tomatoes() -> NewBatch {
        NewBatch {
            crop: "Tomatoes".to_string(),
            variety: Some("Roma".to_string()),
            harvest_date: NaiveDate::from_ymd_opt(2024, 1, 15),
            farm_location: Some(FarmLocation {
                latitude: 36.77,
                longitude: -119.41,
                address: Some("12 Orchard Rd".to_string()),
                farm_name: Some("Green Valley Farm".to_string()),
            }),
            quantity: Some(Quantity::new(500.0, QuantityUnit::Kg)),
            quality: None,
        }
    }

    fn create_cmd(fields: NewBatch) -> BatchCommand {
        BatchCommand::CreateBatch(CreateBatch {
            batch_id: test_batch_id(),
            principal: alice(),
            fields,
            occurred_at: test_time(),
        })
    }

    fn created_batch() -> Batch {
        let mut batch = Batch::empty(test_batch_id());
        let events = batch.handle(&create_cmd(tomatoes())).unwrap();
        batch.apply(&events[0]);
        batch
    }

    fn update_status(by: Principal, status: BatchStatus) -> BatchCommand {
        BatchCommand::UpdateBatch(UpdateBatch {
            batch_id: test_batch_id(),
            principal: by,
            changes: BatchChanges {
                status: Some(status),
                ..BatchChanges::default()
            },
            occurred_at: test_time(),
        })
    }

    fn transfer(by: Principal, to: &str, role: Role) -> BatchCommand {
        BatchCommand::TransferOwnership(TransferOwnership {
            batch_id: test_batch_id(),
            principal: by,
            new_owner: OrganizationId::parse(to).unwrap(),
            new_owner_role: role,
            occurred_at: test_time(),
        })
    }

    fn step(by: Principal, step: LifecycleStep) -> BatchCommand {
        BatchCommand::RecordLifecycleStep(RecordLifecycleStep {
            batch_id: test_batch_id(),
            principal: by,
            step,
            details: StepDetails::default(),
            occurred_at: test_time(),
        })
    }

    fn recall(reason: &str) -> BatchCommand {
        BatchCommand::RecallBatch(RecallBatch {
            batch_id: test_batch_id(),
            principal: regulator(),
            reason: reason.to_string(),
            recall_date: test_time(),
            affected_batches: vec![test_batch_id()],
            occurred_at: test_time(),
        })
    }

    fn run(batch: &mut Batch, cmd: &BatchCommand) -> Result<Vec<BatchEvent>, DomainError> {
        let events = batch.handle(cmd)?;
        for e in &events {
            batch.apply(e);
        }
        Ok(events)
    }

    #[test]
    fn create_batch_emits_batch_created_event() {
        let batch = Batch::empty(test_batch_id());
        let events = batch.handle(&create_cmd(tomatoes())).unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            BatchEvent::BatchCreated(e) => {
                assert_eq!(e.crop, "Tomatoes");
                assert_eq!(e.owner.as_str(), "GreenValley");
                assert_eq!(e.owner_role, Role::Farmer);
                assert_eq!(e.actor.as_str(), "alice");
            }
            _ => panic!("Expected BatchCreated event"),
        }
        assert_eq!(events[0].kind(), EventKind::Create);
    }

    #[test]
    fn created_batch_starts_in_created_status_owned_by_creator() {
        let batch = created_batch();
        assert!(batch.exists());
        assert_eq!(batch.status(), BatchStatus::Created);
        assert_eq!(batch.current_owner().unwrap().as_str(), "GreenValley");
        assert_eq!(batch.current_owner_role(), Some(Role::Farmer));
        assert_eq!(batch.version(), 1);
        assert!(!batch.is_recalled());
    }

    #[test]
    fn create_batch_rejects_missing_required_fields() {
        let cases: Vec<(NewBatch, &str)> = vec![
            (
                NewBatch {
                    crop: "  ".into(),
                    ..tomatoes()
                },
                "crop",
            ),
            (
                NewBatch {
                    harvest_date: None,
                    ..tomatoes()
                },
                "harvestDate",
            ),
            (
                NewBatch {
                    farm_location: None,
                    ..tomatoes()
                },
                "farmLocation",
            ),
            (
                NewBatch {
                    quantity: None,
                    ..tomatoes()
                },
                "quantity",
            ),
        ];

        for (fields, expected) in cases {
            let err = Batch::empty(test_batch_id())
                .handle(&create_cmd(fields))
                .unwrap_err();
            match err {
                DomainError::Validation { field, .. } => assert_eq!(field, expected),
                other => panic!("Expected Validation on {expected}, got {other:?}"),
            }
        }
    }

    #[test]
    fn create_batch_rejects_out_of_range_values() {
        let mut fields = tomatoes();
        fields.quantity = Some(Quantity::new(0.0, QuantityUnit::Kg));
        assert!(matches!(
            Batch::empty(test_batch_id()).handle(&create_cmd(fields)),
            Err(DomainError::Validation { .. })
        ));

        let mut fields = tomatoes();
        fields.farm_location.as_mut().unwrap().latitude = 91.0;
        assert!(matches!(
            Batch::empty(test_batch_id()).handle(&create_cmd(fields)),
            Err(DomainError::Validation { .. })
        ));
    }

    #[test]
    fn create_batch_rejects_duplicate_creation() {
        let batch = created_batch();
        let err = batch.handle(&create_cmd(tomatoes())).unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            _ => panic!("Expected Conflict error for duplicate creation"),
        }
    }

    #[test]
    fn only_farmers_create_batches() {
        let cmd = BatchCommand::CreateBatch(CreateBatch {
            batch_id: test_batch_id(),
            principal: principal("pat", "FreshFoods", Role::Processor),
            fields: tomatoes(),
            occurred_at: test_time(),
        });
        assert!(matches!(
            Batch::empty(test_batch_id()).handle(&cmd),
            Err(DomainError::Unauthorized(_))
        ));
    }

    #[test]
    fn commands_on_unknown_batch_are_not_found() {
        let batch = Batch::empty(test_batch_id());
        for cmd in [
            update_status(alice(), BatchStatus::Processing),
            transfer(alice(), "FreshFoods", Role::Processor),
            recall("contamination"),
        ] {
            assert!(matches!(batch.handle(&cmd), Err(DomainError::NotFound(_))));
        }
    }

    #[test]
    fn command_for_another_batch_is_rejected() {
        let batch = Batch::empty(BatchId::parse("BATCH_other").unwrap());
        assert!(matches!(
            batch.handle(&create_cmd(tomatoes())),
            Err(DomainError::Validation { .. })
        ));
    }

    #[test]
    fn transfer_moves_ownership_without_changing_status() {
        let mut batch = created_batch();
        let events = run(&mut batch, &transfer(alice(), "FreshFoods", Role::Processor)).unwrap();

        match &events[0] {
            BatchEvent::OwnershipTransferred(e) => {
                assert_eq!(e.previous_owner.as_str(), "GreenValley");
                assert_eq!(e.new_owner.as_str(), "FreshFoods");
                assert_eq!(e.previous_owner_role, Role::Farmer);
            }
            _ => panic!("Expected OwnershipTransferred event"),
        }
        assert_eq!(batch.current_owner().unwrap().as_str(), "FreshFoods");
        assert_eq!(batch.current_owner_role(), Some(Role::Processor));
        assert_eq!(batch.status(), BatchStatus::Created);
        assert_eq!(batch.version(), 2);
    }

    #[test]
    fn transfer_by_non_owner_is_unauthorized() {
        let batch = created_batch();
        let intruder = principal("mallory", "OtherFarm", Role::Farmer);
        assert!(matches!(
            batch.handle(&transfer(intruder, "OtherFarm", Role::Farmer)),
            Err(DomainError::Unauthorized(_))
        ));
    }

    #[test]
    fn transfer_to_regulator_role_is_rejected() {
        let batch = created_batch();
        match batch.handle(&transfer(alice(), "FoodAgency", Role::Regulator)) {
            Err(DomainError::Validation { field, .. }) => assert_eq!(field, "newOwnerRole"),
            other => panic!("Expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn transfer_on_terminal_batch_fails_and_emits_nothing() {
        let mut sold = created_batch();
        for s in [
            BatchStatus::Processing,
            BatchStatus::Packaged,
            BatchStatus::InTransit,
            BatchStatus::InStore,
            BatchStatus::Sold,
        ] {
            run(&mut sold, &update_status(alice(), s)).unwrap();
        }
        let version = sold.version();
        match run(&mut sold, &transfer(alice(), "FreshFoods", Role::Processor)) {
            Err(DomainError::TerminalState { status, .. }) => assert_eq!(status, "SOLD"),
            other => panic!("Expected TerminalState, got {other:?}"),
        }
        assert_eq!(sold.version(), version);

        let mut recalled = created_batch();
        run(&mut recalled, &recall("listeria")).unwrap();
        assert!(matches!(
            run(&mut recalled, &transfer(alice(), "FreshFoods", Role::Processor)),
            Err(DomainError::TerminalState { .. })
        ));
    }

    #[test]
    fn update_skipping_states_is_invalid_transition() {
        let batch = created_batch();
        assert!(matches!(
            batch.handle(&update_status(alice(), BatchStatus::InStore)),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn update_to_recalled_is_always_legal() {
        let mut batch = created_batch();
        run(&mut batch, &update_status(alice(), BatchStatus::Recalled)).unwrap();
        assert_eq!(batch.status(), BatchStatus::Recalled);
        assert!(batch.is_recalled());
        // Still legal from a terminal state.
        run(&mut batch, &update_status(alice(), BatchStatus::Recalled)).unwrap();
    }

    #[test]
    fn update_merges_only_submitted_sections() {
        let mut batch = created_batch();
        let quality = Quality {
            grade: Some("A".into()),
            certifications: vec!["organic".into()],
            test_results: None,
        };
        let cmd = BatchCommand::UpdateBatch(UpdateBatch {
            batch_id: test_batch_id(),
            principal: alice(),
            changes: BatchChanges {
                quality: Some(quality.clone()),
                ..BatchChanges::default()
            },
            occurred_at: test_time(),
        });
        let events = run(&mut batch, &cmd).unwrap();

        assert_eq!(batch.quality(), &quality);
        assert_eq!(batch.quantity().unwrap().amount, 500.0);
        assert_eq!(batch.status(), BatchStatus::Created);
        match &events[0] {
            BatchEvent::BatchUpdated(e) => {
                assert!(e.changes.quantity.is_none());
                assert_eq!(e.changes.quality.as_ref(), Some(&quality));
            }
            _ => panic!("Expected BatchUpdated event"),
        }
    }

    #[test]
    fn non_status_updates_remain_allowed_after_sale() {
        let mut batch = created_batch();
        run(&mut batch, &update_status(alice(), BatchStatus::Processing)).unwrap();
        run(&mut batch, &update_status(alice(), BatchStatus::Packaged)).unwrap();
        run(&mut batch, &update_status(alice(), BatchStatus::InTransit)).unwrap();
        run(&mut batch, &update_status(alice(), BatchStatus::InStore)).unwrap();
        run(&mut batch, &update_status(alice(), BatchStatus::Sold)).unwrap();

        let cmd = BatchCommand::UpdateBatch(UpdateBatch {
            batch_id: test_batch_id(),
            principal: alice(),
            changes: BatchChanges {
                retail: Some(Retail {
                    price: Some(3.99),
                    currency: Some("USD".into()),
                    ..Retail::default()
                }),
                ..BatchChanges::default()
            },
            occurred_at: test_time(),
        });
        run(&mut batch, &cmd).unwrap();
        assert_eq!(batch.retail().unwrap().price, Some(3.99));

        assert!(matches!(
            batch.handle(&update_status(alice(), BatchStatus::InStore)),
            Err(DomainError::TerminalState { .. })
        ));
    }

    #[test]
    fn lifecycle_steps_advance_status_and_fill_sections() {
        let mut batch = created_batch();
        run(&mut batch, &transfer(alice(), "FreshFoods", Role::Processor)).unwrap();
        let processor = principal("pat", "FreshFoods", Role::Processor);

        let process = BatchCommand::RecordLifecycleStep(RecordLifecycleStep {
            batch_id: test_batch_id(),
            principal: processor.clone(),
            step: LifecycleStep::Process,
            details: StepDetails {
                processing: Some(Processing {
                    processor: Some("FreshFoods".into()),
                    methods: vec!["washing".into()],
                    ..Processing::default()
                }),
                ..StepDetails::default()
            },
            occurred_at: test_time(),
        });
        let events = run(&mut batch, &process).unwrap();
        assert_eq!(events[0].kind(), EventKind::Process);
        assert_eq!(batch.status(), BatchStatus::Processing);

        let package = BatchCommand::RecordLifecycleStep(RecordLifecycleStep {
            batch_id: test_batch_id(),
            principal: processor.clone(),
            step: LifecycleStep::Package,
            details: StepDetails {
                packaging: Some(crate::fields::Packaging {
                    package_type: Some("crate".into()),
                    material: Some("wood".into()),
                    weight: Some(20.0),
                }),
                ..StepDetails::default()
            },
            occurred_at: test_time(),
        });
        run(&mut batch, &package).unwrap();
        let processing = batch.processing().unwrap();
        assert_eq!(processing.methods, vec!["washing".to_string()]);
        assert_eq!(processing.packaging.as_ref().unwrap().weight, Some(20.0));
        assert_eq!(batch.status(), BatchStatus::Packaged);
    }

    #[test]
    fn lifecycle_step_cannot_skip_ahead() {
        let batch = created_batch();
        assert!(matches!(
            batch.handle(&step(alice(), LifecycleStep::Ship)),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn recall_is_forced_from_any_status_and_repeatable() {
        let mut batch = created_batch();
        run(&mut batch, &step(alice(), LifecycleStep::Process)).unwrap();

        let events = run(&mut batch, &recall("E. coli")).unwrap();
        match &events[0] {
            BatchEvent::BatchRecalled(e) => assert_eq!(e.previous_status, BatchStatus::Processing),
            _ => panic!("Expected BatchRecalled event"),
        }
        let info = batch.recall().unwrap();
        assert!(info.is_recalled);
        assert_eq!(info.reason, "E. coli");
        assert_eq!(batch.status(), BatchStatus::Recalled);

        run(&mut batch, &recall("E. coli")).unwrap();
        assert_eq!(batch.version(), 4);
    }

    #[test]
    fn recall_requires_regulator() {
        let batch = created_batch();
        let cmd = BatchCommand::RecallBatch(RecallBatch {
            batch_id: test_batch_id(),
            principal: alice(),
            reason: "mould".into(),
            recall_date: test_time(),
            affected_batches: vec![],
            occurred_at: test_time(),
        });
        assert!(matches!(batch.handle(&cmd), Err(DomainError::Unauthorized(_))));
    }

    #[test]
    fn regulator_may_update_batches_they_do_not_own() {
        let mut batch = created_batch();
        run(&mut batch, &update_status(regulator(), BatchStatus::Processing)).unwrap();
        assert_eq!(batch.status(), BatchStatus::Processing);
    }

    #[test]
    fn event_round_trips_through_json() {
        let batch = Batch::empty(test_batch_id());
        let events = batch.handle(&create_cmd(tomatoes())).unwrap();
        let json = serde_json::to_string(&events[0]).unwrap();
        let back: BatchEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, events[0]);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Status(BatchStatus),
        Transfer(Role),
        Step(LifecycleStep),
        Recall,
    }

    fn any_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            proptest::sample::select(BatchStatus::ALL.to_vec()).prop_map(Op::Status),
            proptest::sample::select(vec![
                Role::Farmer,
                Role::Processor,
                Role::Distributor,
                Role::Retailer,
            ])
            .prop_map(Op::Transfer),
            proptest::sample::select(LifecycleStep::ALL.to_vec()).prop_map(Op::Step),
            Just(Op::Recall),
        ]
    }

    fn to_command(op: &Op) -> BatchCommand {
        // Regulators may act on any batch, which keeps every op authorized.
        match op {
            Op::Status(s) => update_status(regulator(), *s),
            Op::Transfer(role) => transfer(regulator(), "NextOrg", *role),
            Op::Step(s) => step(regulator(), *s),
            Op::Recall => recall("routine"),
        }
    }

    proptest! {
        /// Property: replaying the emitted log always yields the live snapshot.
        #[test]
        fn fold_of_log_equals_incremental_state(ops in proptest::collection::vec(any_op(), 0..40)) {
            let mut batch = Batch::empty(test_batch_id());
            let mut log = batch.handle(&create_cmd(tomatoes())).unwrap();
            for e in &log {
                batch.apply(e);
            }

            for op in &ops {
                if let Ok(events) = batch.handle(&to_command(op)) {
                    for e in &events {
                        batch.apply(e);
                    }
                    log.extend(events);
                }
            }

            let replayed = fold(test_batch_id(), &log);
            prop_assert_eq!(replayed.version(), log.len() as u64);
            prop_assert_eq!(replayed, batch);
        }

        /// Property: folding the same log twice gives identical snapshots.
        #[test]
        fn fold_is_deterministic(ops in proptest::collection::vec(any_op(), 0..40)) {
            let mut batch = created_batch();
            let mut log = vec![];
            for op in &ops {
                if let Ok(events) = batch.handle(&to_command(op)) {
                    for e in &events {
                        batch.apply(e);
                    }
                    log.extend(events);
                }
            }
            prop_assert_eq!(fold(test_batch_id(), &log), fold(test_batch_id(), &log));
        }

        /// Property: transfers on terminal batches never produce events.
        #[test]
        fn terminal_batches_never_transfer(ops in proptest::collection::vec(any_op(), 0..30)) {
            let mut batch = created_batch();
            for op in &ops {
                if let Ok(events) = batch.handle(&to_command(op)) {
                    for e in &events {
                        batch.apply(e);
                    }
                }
            }
            if batch.status().is_terminal() {
                let is_terminal_error = matches!(
                    batch.handle(&transfer(regulator(), "Elsewhere", Role::Retailer)),
                    Err(DomainError::TerminalState { .. })
                );
                prop_assert!(is_terminal_error);
            }
        }
    }
}
