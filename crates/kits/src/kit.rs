use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use socialstore_core::{
    ActorId, Aggregate, AggregateId, AggregateRoot, DomainError, ValueObject, ensure_not_blank,
    ensure_positive,
};
use socialstore_events::Event;
use socialstore_stock::{MeasureUnit, ProductId};

/// Kit identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KitId(pub AggregateId);

impl KitId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for KitId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One required product in a kit template.
///
/// `product_name` is a snapshot taken when the item was added; later product
/// renames do not flow back into kits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: Decimal,
    pub unit: MeasureUnit,
}

impl ValueObject for KitItem {}

/// Aggregate root: Kit (a template, owns no stock).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kit {
    id: KitId,
    name: String,
    description: String,
    items: Vec<KitItem>,
    active: bool,
    created_by: Option<ActorId>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Kit {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: KitId) -> Self {
        Self {
            id,
            name: String::new(),
            description: String::new(),
            items: Vec::new(),
            active: false,
            created_by: None,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> KitId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn items(&self) -> &[KitItem] {
        &self.items
    }

    pub fn is_active(&self) -> bool {
        self.active
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

    /// Whether the kit references the product (used before deactivating products).
    pub fn contains_product(&self, product_id: ProductId) -> bool {
        self.items.iter().any(|i| i.product_id == product_id)
    }
}

impl AggregateRoot for Kit {
    type Id = KitId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateKit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateKit {
    pub kit_id: KitId,
    pub name: String,
    pub description: String,
    pub items: Vec<KitItem>,
    pub created_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateKit. Replaces name, description and the full item list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateKit {
    pub kit_id: KitId,
    pub name: String,
    pub description: String,
    pub items: Vec<KitItem>,
    pub updated_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateKit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateKit {
    pub kit_id: KitId,
    pub performed_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReactivateKit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateKit {
    pub kit_id: KitId,
    pub performed_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KitCommand {
    CreateKit(CreateKit),
    UpdateKit(UpdateKit),
    DeactivateKit(DeactivateKit),
    ReactivateKit(ReactivateKit),
}

/// Event: KitCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitCreated {
    pub kit_id: KitId,
    pub name: String,
    pub description: String,
    pub items: Vec<KitItem>,
    pub created_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: KitUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitUpdated {
    pub kit_id: KitId,
    pub name: String,
    pub description: String,
    pub items: Vec<KitItem>,
    pub updated_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: KitDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitDeactivated {
    pub kit_id: KitId,
    pub performed_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: KitReactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitReactivated {
    pub kit_id: KitId,
    pub performed_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KitEvent {
    KitCreated(KitCreated),
    KitUpdated(KitUpdated),
    KitDeactivated(KitDeactivated),
    KitReactivated(KitReactivated),
}

impl Event for KitEvent {
    fn event_type(&self) -> &'static str {
        match self {
            KitEvent::KitCreated(_) => "kits.kit.created",
            KitEvent::KitUpdated(_) => "kits.kit.updated",
            KitEvent::KitDeactivated(_) => "kits.kit.deactivated",
            KitEvent::KitReactivated(_) => "kits.kit.reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            KitEvent::KitCreated(e) => e.occurred_at,
            KitEvent::KitUpdated(e) => e.occurred_at,
            KitEvent::KitDeactivated(e) => e.occurred_at,
            KitEvent::KitReactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Kit {
    type Command = KitCommand;
    type Event = KitEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            KitEvent::KitCreated(e) => {
                self.id = e.kit_id;
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.items = e.items.clone();
                self.active = true;
                self.created_by = Some(e.created_by.clone());
                self.created_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
                self.created = true;
            }
            KitEvent::KitUpdated(e) => {
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.items = e.items.clone();
                self.updated_at = Some(e.occurred_at);
            }
            KitEvent::KitDeactivated(e) => {
                self.active = false;
                self.updated_at = Some(e.occurred_at);
            }
            KitEvent::KitReactivated(e) => {
                self.active = true;
                self.updated_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            KitCommand::CreateKit(cmd) => self.handle_create(cmd),
            KitCommand::UpdateKit(cmd) => self.handle_update(cmd),
            KitCommand::DeactivateKit(cmd) => self.handle_deactivate(cmd),
            KitCommand::ReactivateKit(cmd) => self.handle_reactivate(cmd),
        }
    }
}

fn validate_items(items: &[KitItem]) -> Result<(), DomainError> {
    let mut seen = HashSet::new();
    for item in items {
        ensure_not_blank(&item.product_name, "kit item product name")?;
        ensure_positive(item.quantity, &format!("quantity of {}", item.product_name))?;
        if !seen.insert(item.product_id) {
            return Err(DomainError::validation(format!(
                "product {} appears more than once in the kit",
                item.product_name
            )));
        }
    }
    Ok(())
}

impl Kit {
    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("kit {}", self.id)));
        }
        Ok(())
    }

    fn ensure_kit_id(&self, kit_id: KitId) -> Result<(), DomainError> {
        if self.id != kit_id {
            return Err(DomainError::invariant("kit_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateKit) -> Result<Vec<KitEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("kit already exists"));
        }
        ensure_not_blank(&cmd.name, "kit name")?;
        cmd.created_by.ensure_present("created by")?;
        validate_items(&cmd.items)?;

        Ok(vec![KitEvent::KitCreated(KitCreated {
            kit_id: cmd.kit_id,
            name: cmd.name.trim().to_string(),
            description: cmd.description.trim().to_string(),
            items: cmd.items.clone(),
            created_by: cmd.created_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateKit) -> Result<Vec<KitEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_kit_id(cmd.kit_id)?;
        ensure_not_blank(&cmd.name, "kit name")?;
        cmd.updated_by.ensure_present("updated by")?;
        validate_items(&cmd.items)?;

        Ok(vec![KitEvent::KitUpdated(KitUpdated {
            kit_id: cmd.kit_id,
            name: cmd.name.trim().to_string(),
            description: cmd.description.trim().to_string(),
            items: cmd.items.clone(),
            updated_by: cmd.updated_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateKit) -> Result<Vec<KitEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_kit_id(cmd.kit_id)?;
        cmd.performed_by.ensure_present("performed by")?;
        if !self.active {
            return Err(DomainError::validation(format!("kit {} is already inactive", self.name)));
        }

        Ok(vec![KitEvent::KitDeactivated(KitDeactivated {
            kit_id: cmd.kit_id,
            performed_by: cmd.performed_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(&self, cmd: &ReactivateKit) -> Result<Vec<KitEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_kit_id(cmd.kit_id)?;
        cmd.performed_by.ensure_present("performed by")?;
        if self.active {
            return Err(DomainError::validation(format!("kit {} is already active", self.name)));
        }

        Ok(vec![KitEvent::KitReactivated(KitReactivated {
            kit_id: cmd.kit_id,
            performed_by: cmd.performed_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
