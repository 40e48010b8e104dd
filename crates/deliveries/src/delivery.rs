use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use socialstore_beneficiaries::BeneficiaryId;
use socialstore_core::{
    ActorId, Aggregate, AggregateId, AggregateRoot, DomainError, ValueObject, ensure_not_blank,
    ensure_positive,
};
use socialstore_events::Event;
use socialstore_kits::{
    BaseKit, CUSTOM_KIT_SENTINEL, CustomKit, CustomKitItem, KitId, KitItem, StockRequirement,
};
use socialstore_stock::{MeasureUnit, ProductId};

/// Delivery identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(pub AggregateId);

impl DeliveryId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Delivery status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    PendingApproval,
    Approved,
    Scheduled,
    Confirmed,
    Rejected,
    Cancelled,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::PendingApproval => "PENDING_APPROVAL",
            DeliveryStatus::Approved => "APPROVED",
            DeliveryStatus::Scheduled => "SCHEDULED",
            DeliveryStatus::Confirmed => "CONFIRMED",
            DeliveryStatus::Rejected => "REJECTED",
            DeliveryStatus::Cancelled => "CANCELLED",
        }
    }

    /// Terminal deliveries accept no further commands.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeliveryStatus::Confirmed | DeliveryStatus::Rejected | DeliveryStatus::Cancelled
        )
    }
}

impl core::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the delivery's contents came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum KitSource {
    Catalog { kit_id: KitId, kit_name: String },
    Custom { base: Option<BaseKit> },
}

impl KitSource {
    pub fn from_custom(kit: &CustomKit) -> Self {
        KitSource::Custom {
            base: kit.base_kit.clone(),
        }
    }

    /// The catalog kit behind the delivery, if any (custom kits report their base kit).
    pub fn kit_id(&self) -> Option<KitId> {
        match self {
            KitSource::Catalog { kit_id, .. } => Some(*kit_id),
            KitSource::Custom { base } => base.as_ref().map(|b| b.kit_id),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, KitSource::Custom { .. })
    }

    /// Kit id as shown to people: the kit id, or `"custom"` for scratch kits.
    pub fn kit_id_label(&self) -> String {
        self.kit_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| CUSTOM_KIT_SENTINEL.to_string())
    }

    pub fn kit_name_label(&self) -> String {
        match self {
            KitSource::Catalog { kit_name, .. } => kit_name.clone(),
            KitSource::Custom { base: Some(b) } => b.kit_name.clone(),
            KitSource::Custom { base: None } => CUSTOM_KIT_SENTINEL.to_string(),
        }
    }
}

/// Line item snapshot taken when the delivery is created.
///
/// Confirmation deducts exactly these lines, so later kit edits never change
/// what an in-flight delivery takes out of stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: Decimal,
    pub unit: MeasureUnit,
}

impl ValueObject for DeliveryLine {}

impl From<&KitItem> for DeliveryLine {
    fn from(item: &KitItem) -> Self {
        Self {
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            unit: item.unit,
        }
    }
}

impl From<&CustomKitItem> for DeliveryLine {
    fn from(item: &CustomKitItem) -> Self {
        Self {
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            quantity: Decimal::from(item.quantity),
            unit: item.unit,
        }
    }
}

impl StockRequirement for DeliveryLine {
    fn product_id(&self) -> ProductId {
        self.product_id
    }

    fn product_name(&self) -> &str {
        &self.product_name
    }

    fn required_quantity(&self) -> Decimal {
        self.quantity
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub requested_at: DateTime<Utc>,
    pub requested_by: ActorId,
    pub request_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub approved_at: DateTime<Utc>,
    pub approved_by: ActorId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub rejected_at: DateTime<Utc>,
    pub rejected_by: ActorId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub confirmed_at: DateTime<Utc>,
    pub confirmed_by: ActorId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub cancelled_at: DateTime<Utc>,
    pub cancelled_by: ActorId,
    pub reason: String,
}

/// Aggregate root: Delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    id: DeliveryId,
    beneficiary_id: Option<BeneficiaryId>,
    beneficiary_name: String,
    kit: Option<KitSource>,
    lines: Vec<DeliveryLine>,
    status: DeliveryStatus,
    scheduled_date: Option<NaiveDate>,
    scheduled_by: Option<ActorId>,
    notes: Option<String>,
    request: Option<RequestInfo>,
    approval: Option<Approval>,
    rejection: Option<Rejection>,
    confirmation: Option<Confirmation>,
    cancellation: Option<Cancellation>,
    created_by: Option<ActorId>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Delivery {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: DeliveryId) -> Self {
        Self {
            id,
            beneficiary_id: None,
            beneficiary_name: String::new(),
            kit: None,
            lines: Vec::new(),
            status: DeliveryStatus::PendingApproval,
            scheduled_date: None,
            scheduled_by: None,
            notes: None,
            request: None,
            approval: None,
            rejection: None,
            confirmation: None,
            cancellation: None,
            created_by: None,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> DeliveryId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn beneficiary_id(&self) -> Option<BeneficiaryId> {
        self.beneficiary_id
    }

    pub fn beneficiary_name(&self) -> &str {
        &self.beneficiary_name
    }

    pub fn kit(&self) -> Option<&KitSource> {
        self.kit.as_ref()
    }

    pub fn lines(&self) -> &[DeliveryLine] {
        &self.lines
    }

    pub fn status(&self) -> DeliveryStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn scheduled_date(&self) -> Option<NaiveDate> {
        self.scheduled_date
    }

    pub fn scheduled_by(&self) -> Option<&ActorId> {
        self.scheduled_by.as_ref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn request(&self) -> Option<&RequestInfo> {
        self.request.as_ref()
    }

    pub fn approval(&self) -> Option<&Approval> {
        self.approval.as_ref()
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        self.rejection.as_ref()
    }

    pub fn confirmation(&self) -> Option<&Confirmation> {
        self.confirmation.as_ref()
    }

    pub fn cancellation(&self) -> Option<&Cancellation> {
        self.cancellation.as_ref()
    }

    pub fn created_by(&self) -> Option<&ActorId> {
        self.created_by.as_ref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl AggregateRoot for Delivery {
    type Id = DeliveryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateDelivery. Collaborator path straight to SCHEDULED.
///
/// `today` is the calendar date in the store's local time; dates before it are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDelivery {
    pub delivery_id: DeliveryId,
    pub beneficiary_id: BeneficiaryId,
    pub beneficiary_name: String,
    pub kit: KitSource,
    pub lines: Vec<DeliveryLine>,
    pub scheduled_date: NaiveDate,
    pub notes: Option<String>,
    pub created_by: ActorId,
    pub today: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RequestDelivery. Beneficiary path into PENDING_APPROVAL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDelivery {
    pub delivery_id: DeliveryId,
    pub beneficiary_id: BeneficiaryId,
    pub beneficiary_name: String,
    pub kit: KitSource,
    pub lines: Vec<DeliveryLine>,
    pub notes: Option<String>,
    pub requested_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveDelivery {
    pub delivery_id: DeliveryId,
    pub approved_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectDelivery {
    pub delivery_id: DeliveryId,
    pub rejected_by: ActorId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDelivery {
    pub delivery_id: DeliveryId,
    pub scheduled_date: NaiveDate,
    /// Replaces the delivery notes when present.
    pub notes: Option<String>,
    pub scheduled_by: ActorId,
    pub today: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmDelivery {
    pub delivery_id: DeliveryId,
    pub confirmed_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelDelivery {
    pub delivery_id: DeliveryId,
    pub cancelled_by: ActorId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryCommand {
    CreateDelivery(CreateDelivery),
    RequestDelivery(RequestDelivery),
    ApproveDelivery(ApproveDelivery),
    RejectDelivery(RejectDelivery),
    ScheduleDelivery(ScheduleDelivery),
    ConfirmDelivery(ConfirmDelivery),
    CancelDelivery(CancelDelivery),
}

/// Event: DeliveryCreated (directly SCHEDULED).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryCreated {
    pub delivery_id: DeliveryId,
    pub beneficiary_id: BeneficiaryId,
    pub beneficiary_name: String,
    pub kit: KitSource,
    pub lines: Vec<DeliveryLine>,
    pub scheduled_date: NaiveDate,
    pub notes: Option<String>,
    pub created_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DeliveryRequested (PENDING_APPROVAL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequested {
    pub delivery_id: DeliveryId,
    pub beneficiary_id: BeneficiaryId,
    pub beneficiary_name: String,
    pub kit: KitSource,
    pub lines: Vec<DeliveryLine>,
    pub request_notes: Option<String>,
    pub requested_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryApproved {
    pub delivery_id: DeliveryId,
    pub approved_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRejected {
    pub delivery_id: DeliveryId,
    pub rejected_by: ActorId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryScheduled {
    pub delivery_id: DeliveryId,
    pub scheduled_date: NaiveDate,
    pub notes: Option<String>,
    pub scheduled_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DeliveryConfirmed. Carries the lines that left stock with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfirmed {
    pub delivery_id: DeliveryId,
    pub lines: Vec<DeliveryLine>,
    pub confirmed_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryCancelled {
    pub delivery_id: DeliveryId,
    pub cancelled_by: ActorId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryEvent {
    DeliveryCreated(DeliveryCreated),
    DeliveryRequested(DeliveryRequested),
    DeliveryApproved(DeliveryApproved),
    DeliveryRejected(DeliveryRejected),
    DeliveryScheduled(DeliveryScheduled),
    DeliveryConfirmed(DeliveryConfirmed),
    DeliveryCancelled(DeliveryCancelled),
}

impl Event for DeliveryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DeliveryEvent::DeliveryCreated(_) => "deliveries.delivery.created",
            DeliveryEvent::DeliveryRequested(_) => "deliveries.delivery.requested",
            DeliveryEvent::DeliveryApproved(_) => "deliveries.delivery.approved",
            DeliveryEvent::DeliveryRejected(_) => "deliveries.delivery.rejected",
            DeliveryEvent::DeliveryScheduled(_) => "deliveries.delivery.scheduled",
            DeliveryEvent::DeliveryConfirmed(_) => "deliveries.delivery.confirmed",
            DeliveryEvent::DeliveryCancelled(_) => "deliveries.delivery.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DeliveryEvent::DeliveryCreated(e) => e.occurred_at,
            DeliveryEvent::DeliveryRequested(e) => e.occurred_at,
            DeliveryEvent::DeliveryApproved(e) => e.occurred_at,
            DeliveryEvent::DeliveryRejected(e) => e.occurred_at,
            DeliveryEvent::DeliveryScheduled(e) => e.occurred_at,
            DeliveryEvent::DeliveryConfirmed(e) => e.occurred_at,
            DeliveryEvent::DeliveryCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Delivery {
    type Command = DeliveryCommand;
    type Event = DeliveryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DeliveryEvent::DeliveryCreated(e) => {
                self.id = e.delivery_id;
                self.beneficiary_id = Some(e.beneficiary_id);
                self.beneficiary_name = e.beneficiary_name.clone();
                self.kit = Some(e.kit.clone());
                self.lines = e.lines.clone();
                self.status = DeliveryStatus::Scheduled;
                self.scheduled_date = Some(e.scheduled_date);
                self.scheduled_by = Some(e.created_by.clone());
                self.notes = e.notes.clone();
                self.created_by = Some(e.created_by.clone());
                self.created_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
                self.created = true;
            }
            DeliveryEvent::DeliveryRequested(e) => {
                self.id = e.delivery_id;
                self.beneficiary_id = Some(e.beneficiary_id);
                self.beneficiary_name = e.beneficiary_name.clone();
                self.kit = Some(e.kit.clone());
                self.lines = e.lines.clone();
                self.status = DeliveryStatus::PendingApproval;
                self.notes = e.request_notes.clone();
                self.request = Some(RequestInfo {
                    requested_at: e.occurred_at,
                    requested_by: e.requested_by.clone(),
                    request_notes: e.request_notes.clone(),
                });
                self.created_by = Some(e.requested_by.clone());
                self.created_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
                self.created = true;
            }
            DeliveryEvent::DeliveryApproved(e) => {
                self.status = DeliveryStatus::Approved;
                self.approval = Some(Approval {
                    approved_at: e.occurred_at,
                    approved_by: e.approved_by.clone(),
                });
                self.updated_at = Some(e.occurred_at);
            }
            DeliveryEvent::DeliveryRejected(e) => {
                self.status = DeliveryStatus::Rejected;
                self.rejection = Some(Rejection {
                    rejected_at: e.occurred_at,
                    rejected_by: e.rejected_by.clone(),
                    reason: e.reason.clone(),
                });
                self.updated_at = Some(e.occurred_at);
            }
            DeliveryEvent::DeliveryScheduled(e) => {
                self.status = DeliveryStatus::Scheduled;
                self.scheduled_date = Some(e.scheduled_date);
                self.scheduled_by = Some(e.scheduled_by.clone());
                if e.notes.is_some() {
                    self.notes = e.notes.clone();
                }
                self.updated_at = Some(e.occurred_at);
            }
            DeliveryEvent::DeliveryConfirmed(e) => {
                self.status = DeliveryStatus::Confirmed;
                self.confirmation = Some(Confirmation {
                    confirmed_at: e.occurred_at,
                    confirmed_by: e.confirmed_by.clone(),
                });
                self.updated_at = Some(e.occurred_at);
            }
            DeliveryEvent::DeliveryCancelled(e) => {
                self.status = DeliveryStatus::Cancelled;
                self.cancellation = Some(Cancellation {
                    cancelled_at: e.occurred_at,
                    cancelled_by: e.cancelled_by.clone(),
                    reason: e.reason.clone(),
                });
                self.updated_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DeliveryCommand::CreateDelivery(cmd) => self.handle_create(cmd),
            DeliveryCommand::RequestDelivery(cmd) => self.handle_request(cmd),
            DeliveryCommand::ApproveDelivery(cmd) => self.handle_approve(cmd),
            DeliveryCommand::RejectDelivery(cmd) => self.handle_reject(cmd),
            DeliveryCommand::ScheduleDelivery(cmd) => self.handle_schedule(cmd),
            DeliveryCommand::ConfirmDelivery(cmd) => self.handle_confirm(cmd),
            DeliveryCommand::CancelDelivery(cmd) => self.handle_cancel(cmd),
        }
    }
}

fn clean_notes(notes: &Option<String>) -> Option<String> {
    notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

fn ensure_not_in_past(date: NaiveDate, today: NaiveDate) -> Result<(), DomainError> {
    if date < today {
        return Err(DomainError::validation(format!(
            "scheduled date {date} is in the past (today is {today})"
        )));
    }
    Ok(())
}

fn validate_lines(lines: &[DeliveryLine]) -> Result<(), DomainError> {
    for line in lines {
        ensure_not_blank(&line.product_name, "delivery line product name")?;
        ensure_positive(line.quantity, &format!("quantity of {}", line.product_name))?;
    }
    Ok(())
}

impl Delivery {
    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("delivery {}", self.id)));
        }
        Ok(())
    }

    fn ensure_delivery_id(&self, delivery_id: DeliveryId) -> Result<(), DomainError> {
        if self.id != delivery_id {
            return Err(DomainError::invariant("delivery_id mismatch"));
        }
        Ok(())
    }

    fn ensure_new(&self) -> Result<(), DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!("delivery {} already exists", self.id)));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: DeliveryStatus, action: &str) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::validation(format!(
                "delivery must be {expected} to {action} (current: {})",
                self.status
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateDelivery) -> Result<Vec<DeliveryEvent>, DomainError> {
        self.ensure_new()?;
        cmd.created_by.ensure_present("created by")?;
        ensure_not_blank(&cmd.beneficiary_name, "beneficiary name")?;
        validate_lines(&cmd.lines)?;
        ensure_not_in_past(cmd.scheduled_date, cmd.today)?;

        Ok(vec![DeliveryEvent::DeliveryCreated(DeliveryCreated {
            delivery_id: cmd.delivery_id,
            beneficiary_id: cmd.beneficiary_id,
            beneficiary_name: cmd.beneficiary_name.trim().to_string(),
            kit: cmd.kit.clone(),
            lines: cmd.lines.clone(),
            scheduled_date: cmd.scheduled_date,
            notes: clean_notes(&cmd.notes),
            created_by: cmd.created_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_request(&self, cmd: &RequestDelivery) -> Result<Vec<DeliveryEvent>, DomainError> {
        self.ensure_new()?;
        cmd.requested_by.ensure_present("requested by")?;
        ensure_not_blank(&cmd.beneficiary_name, "beneficiary name")?;
        validate_lines(&cmd.lines)?;

        Ok(vec![DeliveryEvent::DeliveryRequested(DeliveryRequested {
            delivery_id: cmd.delivery_id,
            beneficiary_id: cmd.beneficiary_id,
            beneficiary_name: cmd.beneficiary_name.trim().to_string(),
            kit: cmd.kit.clone(),
            lines: cmd.lines.clone(),
            request_notes: clean_notes(&cmd.notes),
            requested_by: cmd.requested_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveDelivery) -> Result<Vec<DeliveryEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_delivery_id(cmd.delivery_id)?;
        cmd.approved_by.ensure_present("approver")?;
        self.ensure_status(DeliveryStatus::PendingApproval, "approve")?;

        Ok(vec![DeliveryEvent::DeliveryApproved(DeliveryApproved {
            delivery_id: cmd.delivery_id,
            approved_by: cmd.approved_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectDelivery) -> Result<Vec<DeliveryEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_delivery_id(cmd.delivery_id)?;
        cmd.rejected_by.ensure_present("approver")?;
        self.ensure_status(DeliveryStatus::PendingApproval, "reject")?;
        ensure_not_blank(&cmd.reason, "rejection reason")?;

        Ok(vec![DeliveryEvent::DeliveryRejected(DeliveryRejected {
            delivery_id: cmd.delivery_id,
            rejected_by: cmd.rejected_by.clone(),
            reason: cmd.reason.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_schedule(&self, cmd: &ScheduleDelivery) -> Result<Vec<DeliveryEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_delivery_id(cmd.delivery_id)?;
        cmd.scheduled_by.ensure_present("scheduler")?;
        self.ensure_status(DeliveryStatus::Approved, "schedule")?;
        ensure_not_in_past(cmd.scheduled_date, cmd.today)?;

        Ok(vec![DeliveryEvent::DeliveryScheduled(DeliveryScheduled {
            delivery_id: cmd.delivery_id,
            scheduled_date: cmd.scheduled_date,
            notes: clean_notes(&cmd.notes),
            scheduled_by: cmd.scheduled_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &ConfirmDelivery) -> Result<Vec<DeliveryEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_delivery_id(cmd.delivery_id)?;
        cmd.confirmed_by.ensure_present("confirmer")?;
        self.ensure_status(DeliveryStatus::Scheduled, "confirm")?;

        Ok(vec![DeliveryEvent::DeliveryConfirmed(DeliveryConfirmed {
            delivery_id: cmd.delivery_id,
            lines: self.lines.clone(),
            confirmed_by: cmd.confirmed_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelDelivery) -> Result<Vec<DeliveryEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_delivery_id(cmd.delivery_id)?;
        cmd.cancelled_by.ensure_present("canceller")?;
        if self.status.is_terminal() {
            return Err(DomainError::validation(format!(
                "delivery is {} and can no longer be cancelled",
                self.status
            )));
        }
        ensure_not_blank(&cmd.reason, "cancellation reason")?;

        Ok(vec![DeliveryEvent::DeliveryCancelled(DeliveryCancelled {
            delivery_id: cmd.delivery_id,
            cancelled_by: cmd.cancelled_by.clone(),
            reason: cmd.reason.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use socialstore_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    fn tomorrow() -> NaiveDate {
        today().checked_add_days(Days::new(1)).unwrap()
    }

    fn yesterday() -> NaiveDate {
        today().checked_sub_days(Days::new(1)).unwrap()
    }

    fn staff() -> ActorId {
        ActorId::new("staff-1")
    }

    fn lines() -> Vec<DeliveryLine> {
        vec![
            DeliveryLine {
                product_id: ProductId::new(AggregateId::new()),
                product_name: "Rice".to_string(),
                quantity: dec!(2),
                unit: MeasureUnit::Kilogram,
            },
            DeliveryLine {
                product_id: ProductId::new(AggregateId::new()),
                product_name: "Soap".to_string(),
                quantity: dec!(1),
                unit: MeasureUnit::Unit,
            },
        ]
    }

    fn catalog_kit() -> KitSource {
        KitSource::Catalog {
            kit_id: KitId::new(AggregateId::new()),
            kit_name: "Basic kit".to_string(),
        }
    }

    fn request_cmd(id: DeliveryId) -> DeliveryCommand {
        DeliveryCommand::RequestDelivery(RequestDelivery {
            delivery_id: id,
            beneficiary_id: BeneficiaryId::new(AggregateId::new()),
            beneficiary_name: "Ana".to_string(),
            kit: catalog_kit(),
            lines: lines(),
            notes: Some("after 5pm".to_string()),
            requested_by: ActorId::new("auth|ana"),
            occurred_at: test_time(),
        })
    }

    fn create_cmd(id: DeliveryId, date: NaiveDate) -> DeliveryCommand {
        DeliveryCommand::CreateDelivery(CreateDelivery {
            delivery_id: id,
            beneficiary_id: BeneficiaryId::new(AggregateId::new()),
            beneficiary_name: "Ana".to_string(),
            kit: catalog_kit(),
            lines: lines(),
            scheduled_date: date,
            notes: None,
            created_by: staff(),
            today: today(),
            occurred_at: test_time(),
        })
    }

    fn approve(d: &Delivery) -> DeliveryCommand {
        DeliveryCommand::ApproveDelivery(ApproveDelivery {
            delivery_id: d.id_typed(),
            approved_by: staff(),
            occurred_at: test_time(),
        })
    }

    fn reject(d: &Delivery, reason: &str) -> DeliveryCommand {
        DeliveryCommand::RejectDelivery(RejectDelivery {
            delivery_id: d.id_typed(),
            rejected_by: staff(),
            reason: reason.to_string(),
            occurred_at: test_time(),
        })
    }

    fn schedule(d: &Delivery, date: NaiveDate) -> DeliveryCommand {
        DeliveryCommand::ScheduleDelivery(ScheduleDelivery {
            delivery_id: d.id_typed(),
            scheduled_date: date,
            notes: None,
            scheduled_by: staff(),
            today: today(),
            occurred_at: test_time(),
        })
    }

    fn confirm(d: &Delivery) -> DeliveryCommand {
        DeliveryCommand::ConfirmDelivery(ConfirmDelivery {
            delivery_id: d.id_typed(),
            confirmed_by: staff(),
            occurred_at: test_time(),
        })
    }

    fn cancel(d: &Delivery, reason: &str) -> DeliveryCommand {
        DeliveryCommand::CancelDelivery(CancelDelivery {
            delivery_id: d.id_typed(),
            cancelled_by: ActorId::new("auth|ana"),
            reason: reason.to_string(),
            occurred_at: test_time(),
        })
    }

    fn run(d: &mut Delivery, cmd: DeliveryCommand) {
        execute(d, &cmd).unwrap();
    }

    fn pending() -> Delivery {
        let id = DeliveryId::new(AggregateId::new());
        let mut d = Delivery::empty(id);
        run(&mut d, request_cmd(id));
        d
    }

    fn approved() -> Delivery {
        let mut d = pending();
        let cmd = approve(&d);
        run(&mut d, cmd);
        d
    }

    fn scheduled() -> Delivery {
        let mut d = approved();
        let cmd = schedule(&d, tomorrow());
        run(&mut d, cmd);
        d
    }

    fn confirmed() -> Delivery {
        let mut d = scheduled();
        let cmd = confirm(&d);
        run(&mut d, cmd);
        d
    }

    fn rejected() -> Delivery {
        let mut d = pending();
        let cmd = reject(&d, "not eligible this month");
        run(&mut d, cmd);
        d
    }

    fn cancelled() -> Delivery {
        let mut d = pending();
        let cmd = cancel(&d, "no longer needed");
        run(&mut d, cmd);
        d
    }

    fn every_transition(d: &Delivery) -> Vec<DeliveryCommand> {
        vec![
            approve(d),
            reject(d, "reason"),
            schedule(d, tomorrow()),
            confirm(d),
            cancel(d, "reason"),
        ]
    }

    #[test]
    fn request_starts_pending_with_request_info() {
        let d = pending();
        assert_eq!(d.status(), DeliveryStatus::PendingApproval);
        let request = d.request().unwrap();
        assert_eq!(request.request_notes.as_deref(), Some("after 5pm"));
        assert_eq!(d.created_by().map(ActorId::as_str), Some("auth|ana"));
        assert!(d.approval().is_none());
        assert_eq!(d.version(), 1);
    }

    #[test]
    fn full_lifecycle_request_to_confirmed() {
        let d = confirmed();
        assert_eq!(d.status(), DeliveryStatus::Confirmed);
        assert_eq!(d.scheduled_date(), Some(tomorrow()));
        assert!(d.approval().is_some());
        assert!(d.confirmation().is_some());
        assert!(d.rejection().is_none());
        assert!(d.cancellation().is_none());
        assert_eq!(d.version(), 4);
    }

    #[test]
    fn confirm_event_carries_line_snapshot() {
        let d = scheduled();
        let events = d.handle(&confirm(&d)).unwrap();
        let DeliveryEvent::DeliveryConfirmed(e) = &events[0] else {
            panic!("Expected DeliveryConfirmed event");
        };
        assert_eq!(e.lines, d.lines());
    }

    #[test]
    fn create_goes_straight_to_scheduled() {
        let id = DeliveryId::new(AggregateId::new());
        let mut d = Delivery::empty(id);
        run(&mut d, create_cmd(id, today()));

        assert_eq!(d.status(), DeliveryStatus::Scheduled);
        assert!(d.request().is_none());
        assert_eq!(d.scheduled_by().map(ActorId::as_str), Some("staff-1"));
    }

    #[test]
    fn create_in_the_past_is_rejected() {
        let id = DeliveryId::new(AggregateId::new());
        let err = Delivery::empty(id)
            .handle(&create_cmd(id, yesterday()))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("in the past")));
    }

    #[test]
    fn create_with_blank_actor_is_rejected() {
        let id = DeliveryId::new(AggregateId::new());
        let DeliveryCommand::CreateDelivery(mut cmd) = create_cmd(id, tomorrow()) else {
            unreachable!()
        };
        cmd.created_by = ActorId::new("");
        let err = Delivery::empty(id)
            .handle(&DeliveryCommand::CreateDelivery(cmd))
            .unwrap_err();
        assert_eq!(err, DomainError::validation("created by cannot be empty"));
    }

    #[test]
    fn approving_twice_names_the_rule() {
        let d = approved();
        let err = d.handle(&approve(&d)).unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("delivery must be PENDING_APPROVAL to approve (current: APPROVED)")
        );
    }

    #[test]
    fn reject_without_reason_keeps_request_pending() {
        let mut d = pending();
        let before = d.clone();
        let cmd = reject(&d, "   ");

        let err = execute(&mut d, &cmd).unwrap_err();

        assert_eq!(err, DomainError::validation("rejection reason cannot be empty"));
        assert_eq!(d, before);
        assert_eq!(d.status(), DeliveryStatus::PendingApproval);
    }

    #[test]
    fn schedule_requires_approval_and_future_date() {
        let p = pending();
        assert!(matches!(
            p.handle(&schedule(&p, tomorrow())),
            Err(DomainError::Validation(msg)) if msg.contains("must be APPROVED to schedule")
        ));

        let a = approved();
        assert!(matches!(
            a.handle(&schedule(&a, yesterday())),
            Err(DomainError::Validation(_))
        ));
        assert!(a.handle(&schedule(&a, today())).is_ok());
    }

    #[test]
    fn confirm_requires_scheduled() {
        for d in [pending(), approved()] {
            let err = d.handle(&confirm(&d)).unwrap_err();
            assert!(matches!(err, DomainError::Validation(msg) if msg.contains("to confirm")));
        }
    }

    #[test]
    fn any_non_terminal_delivery_can_be_cancelled() {
        for mut d in [pending(), approved(), scheduled()] {
            let cmd = cancel(&d, "moved away");
            run(&mut d, cmd);
            assert_eq!(d.status(), DeliveryStatus::Cancelled);
            assert_eq!(d.cancellation().map(|c| c.reason.as_str()), Some("moved away"));
        }
    }

    #[test]
    fn cancel_requires_reason() {
        let d = scheduled();
        assert_eq!(
            d.handle(&cancel(&d, "")).unwrap_err(),
            DomainError::validation("cancellation reason cannot be empty")
        );
    }

    #[test]
    fn terminal_deliveries_accept_no_command() {
        for d in [confirmed(), rejected(), cancelled()] {
            assert!(d.is_terminal());
            for cmd in every_transition(&d) {
                let mut copy = d.clone();
                assert!(matches!(execute(&mut copy, &cmd), Err(DomainError::Validation(_))));
                assert_eq!(copy, d);
            }
        }
    }

    #[test]
    fn transition_table_is_exact() {
        // (state, [approve, reject, schedule, confirm, cancel]) -> allowed?
        let table: Vec<(Delivery, [bool; 5])> = vec![
            (pending(), [true, true, false, false, true]),
            (approved(), [false, false, true, false, true]),
            (scheduled(), [false, false, false, true, true]),
            (confirmed(), [false; 5]),
            (rejected(), [false; 5]),
            (cancelled(), [false; 5]),
        ];

        for (d, allowed) in table {
            for (cmd, ok) in every_transition(&d).into_iter().zip(allowed) {
                assert_eq!(d.handle(&cmd).is_ok(), ok, "{} / {:?}", d.status(), cmd);
            }
        }
    }

    #[test]
    fn blank_actor_is_rejected_on_transitions() {
        let d = pending();
        let cmd = DeliveryCommand::ApproveDelivery(ApproveDelivery {
            delivery_id: d.id_typed(),
            approved_by: ActorId::new("  "),
            occurred_at: test_time(),
        });
        assert_eq!(
            d.handle(&cmd).unwrap_err(),
            DomainError::validation("approver cannot be empty")
        );
    }

    #[test]
    fn unknown_delivery_is_not_found() {
        let d = Delivery::empty(DeliveryId::new(AggregateId::new()));
        assert!(matches!(d.handle(&confirm(&d)), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn custom_kit_source_labels() {
        let scratch = KitSource::Custom { base: None };
        assert_eq!(scratch.kit_id_label(), "custom");
        assert_eq!(scratch.kit_name_label(), "custom");

        let kit_id = KitId::new(AggregateId::new());
        let based = KitSource::Custom {
            base: Some(BaseKit {
                kit_id,
                kit_name: "Hygiene kit".to_string(),
            }),
        };
        assert_eq!(based.kit_id_label(), kit_id.to_string());
        assert_eq!(based.kit_name_label(), "Hygiene kit");
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let d = scheduled();
        let before = d.clone();
        let first = d.handle(&confirm(&d)).unwrap();
        let second = d.handle(&confirm(&d)).unwrap();
        assert_eq!(d, before);
        assert_eq!(first, second);
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Approve,
        Reject,
        Schedule,
        Confirm,
        Cancel,
    }

    fn op_command(d: &Delivery, op: Op) -> DeliveryCommand {
        match op {
            Op::Approve => approve(d),
            Op::Reject => reject(d, "not eligible"),
            Op::Schedule => schedule(d, tomorrow()),
            Op::Confirm => confirm(d),
            Op::Cancel => cancel(d, "changed plans"),
        }
    }

    fn legal(from: DeliveryStatus, to: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        matches!(
            (from, to),
            (PendingApproval, Approved)
                | (PendingApproval, Rejected)
                | (Approved, Scheduled)
                | (Scheduled, Confirmed)
                | (PendingApproval | Approved | Scheduled, Cancelled)
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: arbitrary command sequences only ever follow legal edges, and
        /// a rejected command leaves the delivery exactly as it was.
        #[test]
        fn status_only_moves_along_legal_edges(
            ops in prop::collection::vec(
                prop_oneof![
                    Just(Op::Approve),
                    Just(Op::Reject),
                    Just(Op::Schedule),
                    Just(Op::Confirm),
                    Just(Op::Cancel),
                ],
                1..20,
            )
        ) {
            let mut d = pending();
            for op in ops {
                let before = d.clone();
                let cmd = op_command(&d, op);
                match execute(&mut d, &cmd) {
                    Ok(_) => prop_assert!(legal(before.status(), d.status())),
                    Err(_) => prop_assert_eq!(&d, &before),
                }
            }
        }
    }
}
