//! Beneficiaries domain module (event-sourced).
//!
//! Students and households registered with the social store. Only active
//! beneficiaries may request or receive deliveries.

pub mod beneficiary;

pub use beneficiary::{
    Beneficiary, BeneficiaryCommand, BeneficiaryDeactivated, BeneficiaryEvent, BeneficiaryId,
    BeneficiaryProfile, BeneficiaryReactivated, BeneficiaryRegistered, DeactivateBeneficiary,
    ProfileUpdated, ReactivateBeneficiary, RegisterBeneficiary, UpdateProfile,
};

/// Aggregate type tag used for beneficiary streams.
pub const BENEFICIARY_AGGREGATE: &str = "beneficiaries.beneficiary";
