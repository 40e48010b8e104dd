use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use socialstore_core::{ActorId, Aggregate, AggregateId, AggregateRoot, DomainError, ensure_not_blank};
use socialstore_events::Event;

/// Beneficiary identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BeneficiaryId(pub AggregateId);

impl BeneficiaryId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BeneficiaryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Contact and enrolment details for a beneficiary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeneficiaryProfile {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub student_number: Option<String>,
    pub course: Option<String>,
    pub household_size: Option<u32>,
    pub notes: Option<String>,
}

impl BeneficiaryProfile {
    fn validate(&self) -> Result<(), DomainError> {
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(DomainError::validation(format!("invalid email address: {email}")));
            }
        }
        if self.household_size == Some(0) {
            return Err(DomainError::validation("household size must be at least 1"));
        }
        Ok(())
    }
}

/// Aggregate root: Beneficiary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beneficiary {
    id: BeneficiaryId,
    user_id: Option<ActorId>,
    name: String,
    profile: BeneficiaryProfile,
    active: bool,
    registered_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Beneficiary {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: BeneficiaryId) -> Self {
        Self {
            id,
            user_id: None,
            name: String::new(),
            profile: BeneficiaryProfile::default(),
            active: false,
            registered_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> BeneficiaryId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    /// Identity issued by the auth provider.
    pub fn user_id(&self) -> Option<&ActorId> {
        self.user_id.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn profile(&self) -> &BeneficiaryProfile {
        &self.profile
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Deliveries may only be created for an existing, active beneficiary.
    pub fn ensure_can_receive(&self) -> Result<(), DomainError> {
        self.ensure_exists()?;
        if !self.active {
            return Err(DomainError::validation(format!(
                "beneficiary {} is not active",
                self.name
            )));
        }
        Ok(())
    }
}

impl AggregateRoot for Beneficiary {
    type Id = BeneficiaryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterBeneficiary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBeneficiary {
    pub beneficiary_id: BeneficiaryId,
    pub user_id: ActorId,
    pub name: String,
    pub profile: BeneficiaryProfile,
    pub registered_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProfile {
    pub beneficiary_id: BeneficiaryId,
    /// Optional new name (if None, keep existing).
    pub name: Option<String>,
    pub profile: BeneficiaryProfile,
    pub updated_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateBeneficiary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateBeneficiary {
    pub beneficiary_id: BeneficiaryId,
    pub performed_by: ActorId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReactivateBeneficiary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactivateBeneficiary {
    pub beneficiary_id: BeneficiaryId,
    pub performed_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BeneficiaryCommand {
    RegisterBeneficiary(RegisterBeneficiary),
    UpdateProfile(UpdateProfile),
    DeactivateBeneficiary(DeactivateBeneficiary),
    ReactivateBeneficiary(ReactivateBeneficiary),
}

/// Event: BeneficiaryRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeneficiaryRegistered {
    pub beneficiary_id: BeneficiaryId,
    pub user_id: ActorId,
    pub name: String,
    pub profile: BeneficiaryProfile,
    pub registered_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProfileUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdated {
    pub beneficiary_id: BeneficiaryId,
    pub name: String,
    pub profile: BeneficiaryProfile,
    pub updated_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BeneficiaryDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeneficiaryDeactivated {
    pub beneficiary_id: BeneficiaryId,
    pub performed_by: ActorId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BeneficiaryReactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeneficiaryReactivated {
    pub beneficiary_id: BeneficiaryId,
    pub performed_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BeneficiaryEvent {
    BeneficiaryRegistered(BeneficiaryRegistered),
    ProfileUpdated(ProfileUpdated),
    BeneficiaryDeactivated(BeneficiaryDeactivated),
    BeneficiaryReactivated(BeneficiaryReactivated),
}

impl Event for BeneficiaryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BeneficiaryEvent::BeneficiaryRegistered(_) => "beneficiaries.beneficiary.registered",
            BeneficiaryEvent::ProfileUpdated(_) => "beneficiaries.beneficiary.profile_updated",
            BeneficiaryEvent::BeneficiaryDeactivated(_) => "beneficiaries.beneficiary.deactivated",
            BeneficiaryEvent::BeneficiaryReactivated(_) => "beneficiaries.beneficiary.reactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BeneficiaryEvent::BeneficiaryRegistered(e) => e.occurred_at,
            BeneficiaryEvent::ProfileUpdated(e) => e.occurred_at,
            BeneficiaryEvent::BeneficiaryDeactivated(e) => e.occurred_at,
            BeneficiaryEvent::BeneficiaryReactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Beneficiary {
    type Command = BeneficiaryCommand;
    type Event = BeneficiaryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BeneficiaryEvent::BeneficiaryRegistered(e) => {
                self.id = e.beneficiary_id;
                self.user_id = Some(e.user_id.clone());
                self.name = e.name.clone();
                self.profile = e.profile.clone();
                self.active = true;
                self.registered_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
                self.created = true;
            }
            BeneficiaryEvent::ProfileUpdated(e) => {
                self.name = e.name.clone();
                self.profile = e.profile.clone();
                self.updated_at = Some(e.occurred_at);
            }
            BeneficiaryEvent::BeneficiaryDeactivated(e) => {
                self.active = false;
                self.updated_at = Some(e.occurred_at);
            }
            BeneficiaryEvent::BeneficiaryReactivated(e) => {
                self.active = true;
                self.updated_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BeneficiaryCommand::RegisterBeneficiary(cmd) => self.handle_register(cmd),
            BeneficiaryCommand::UpdateProfile(cmd) => self.handle_update(cmd),
            BeneficiaryCommand::DeactivateBeneficiary(cmd) => self.handle_deactivate(cmd),
            BeneficiaryCommand::ReactivateBeneficiary(cmd) => self.handle_reactivate(cmd),
        }
    }
}

impl Beneficiary {
    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("beneficiary {}", self.id)));
        }
        Ok(())
    }

    fn ensure_beneficiary_id(&self, beneficiary_id: BeneficiaryId) -> Result<(), DomainError> {
        if self.id != beneficiary_id {
            return Err(DomainError::invariant("beneficiary_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(
        &self,
        cmd: &RegisterBeneficiary,
    ) -> Result<Vec<BeneficiaryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("beneficiary already exists"));
        }
        ensure_not_blank(&cmd.name, "beneficiary name")?;
        cmd.user_id.ensure_present("user id")?;
        cmd.registered_by.ensure_present("registered by")?;
        cmd.profile.validate()?;

        Ok(vec![BeneficiaryEvent::BeneficiaryRegistered(BeneficiaryRegistered {
            beneficiary_id: cmd.beneficiary_id,
            user_id: cmd.user_id.clone(),
            name: cmd.name.trim().to_string(),
            profile: cmd.profile.clone(),
            registered_by: cmd.registered_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProfile) -> Result<Vec<BeneficiaryEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_beneficiary_id(cmd.beneficiary_id)?;
        cmd.updated_by.ensure_present("updated by")?;

        let name = cmd
            .name
            .as_deref()
            .map(str::trim)
            .unwrap_or(&self.name)
            .to_string();
        ensure_not_blank(&name, "beneficiary name")?;
        cmd.profile.validate()?;

        Ok(vec![BeneficiaryEvent::ProfileUpdated(ProfileUpdated {
            beneficiary_id: cmd.beneficiary_id,
            name,
            profile: cmd.profile.clone(),
            updated_by: cmd.updated_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(
        &self,
        cmd: &DeactivateBeneficiary,
    ) -> Result<Vec<BeneficiaryEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_beneficiary_id(cmd.beneficiary_id)?;
        cmd.performed_by.ensure_present("performed by")?;

        if !self.active {
            return Err(DomainError::validation(format!(
                "beneficiary {} is already inactive",
                self.name
            )));
        }

        Ok(vec![BeneficiaryEvent::BeneficiaryDeactivated(BeneficiaryDeactivated {
            beneficiary_id: cmd.beneficiary_id,
            performed_by: cmd.performed_by.clone(),
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reactivate(
        &self,
        cmd: &ReactivateBeneficiary,
    ) -> Result<Vec<BeneficiaryEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_beneficiary_id(cmd.beneficiary_id)?;
        cmd.performed_by.ensure_present("performed by")?;

        if self.active {
            return Err(DomainError::validation(format!(
                "beneficiary {} is already active",
                self.name
            )));
        }

        Ok(vec![BeneficiaryEvent::BeneficiaryReactivated(BeneficiaryReactivated {
            beneficiary_id: cmd.beneficiary_id,
            performed_by: cmd.performed_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
