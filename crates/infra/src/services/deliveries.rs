//! The delivery lifecycle across aggregates.
//!
//! The Delivery aggregate enforces the transition table. This service adds
//! the checks it cannot make on its own (beneficiary and kit activity, stock
//! availability) and turns a confirmation into one atomic commit of the
//! delivery transition plus an EXIT movement per product.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tracing::info;

use socialstore_beneficiaries::BeneficiaryId;
use socialstore_core::{ActorId, Aggregate, AggregateId, DomainError};
use socialstore_deliveries::{
    ApproveDelivery, CancelDelivery, ConfirmDelivery, CreateDelivery, DELIVERY_AGGREGATE, Delivery,
    DeliveryCommand, DeliveryId, DeliveryLine, KitSource, RejectDelivery, RequestDelivery,
    ScheduleDelivery,
};
use socialstore_events::{EventBus, EventEnvelope};
use socialstore_kits::{KitId, first_shortfall};
use socialstore_stock::{
    MovementId, MovementType, PRODUCT_AGGREGATE, ProductCommand, ProductId, RecordMovement,
};

use super::{Context, make_delivery};
use crate::command_dispatcher::DispatchError;
use crate::error::{DispatchResultExt, ServiceResult};
use crate::event_store::EventStore;

pub struct Deliveries<'a, S, B> {
    ctx: &'a Context<S, B>,
}

impl<'a, S, B> Deliveries<'a, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub(crate) fn new(ctx: &'a Context<S, B>) -> Self {
        Self { ctx }
    }

    /// Collaborator path: a delivery scheduled directly from an available kit.
    pub fn create_delivery(
        &self,
        beneficiary_id: BeneficiaryId,
        kit_id: KitId,
        scheduled_date: NaiveDate,
        notes: Option<String>,
        created_by: &ActorId,
    ) -> ServiceResult<Delivery> {
        let id = AggregateId::new();

        let delivery = self.ctx.with_retries("failed to create delivery", || {
            let beneficiary = self.ctx.beneficiary(beneficiary_id)?;
            beneficiary.ensure_can_receive()?;
            let kit = self.ctx.active_kit(kit_id)?;

            let lines: Vec<DeliveryLine> = kit.items().iter().map(DeliveryLine::from).collect();
            self.ensure_available(&lines)?;

            let cmd = DeliveryCommand::CreateDelivery(CreateDelivery {
                delivery_id: DeliveryId::new(id),
                beneficiary_id,
                beneficiary_name: beneficiary.name().to_string(),
                kit: KitSource::Catalog {
                    kit_id,
                    kit_name: kit.name().to_string(),
                },
                lines,
                scheduled_date,
                notes: notes.clone(),
                created_by: created_by.clone(),
                today: self.ctx.config.today(),
                occurred_at: Utc::now(),
            });
            self.ctx
                .dispatcher
                .dispatch(id, DELIVERY_AGGREGATE, &cmd, make_delivery)
        })?;

        info!(
            delivery_id = %id,
            beneficiary_id = %beneficiary_id,
            kit_id = %kit_id,
            scheduled_date = %scheduled_date,
            "delivery scheduled"
        );
        Ok(delivery)
    }

    /// Beneficiary path: a request waiting for approval. Stock is not checked yet.
    pub fn request_delivery(
        &self,
        beneficiary_id: BeneficiaryId,
        kit_id: KitId,
        notes: Option<String>,
        requested_by: &ActorId,
    ) -> ServiceResult<Delivery> {
        let id = AggregateId::new();

        let delivery = self.ctx.with_retries("failed to request delivery", || {
            let beneficiary = self.ctx.beneficiary(beneficiary_id)?;
            beneficiary.ensure_can_receive()?;
            let kit = self.ctx.active_kit(kit_id)?;

            let cmd = DeliveryCommand::RequestDelivery(RequestDelivery {
                delivery_id: DeliveryId::new(id),
                beneficiary_id,
                beneficiary_name: beneficiary.name().to_string(),
                kit: KitSource::Catalog {
                    kit_id,
                    kit_name: kit.name().to_string(),
                },
                lines: kit.items().iter().map(DeliveryLine::from).collect(),
                notes: notes.clone(),
                requested_by: requested_by.clone(),
                occurred_at: Utc::now(),
            });
            self.ctx
                .dispatcher
                .dispatch(id, DELIVERY_AGGREGATE, &cmd, make_delivery)
        })?;

        info!(delivery_id = %id, beneficiary_id = %beneficiary_id, kit_id = %kit_id, "delivery requested");
        Ok(delivery)
    }

    pub fn approve_delivery_request(&self, delivery_id: DeliveryId, approver: &ActorId) -> ServiceResult<Delivery> {
        let cmd = DeliveryCommand::ApproveDelivery(ApproveDelivery {
            delivery_id,
            approved_by: approver.clone(),
            occurred_at: Utc::now(),
        });
        self.transition("failed to approve delivery", delivery_id, &cmd)
    }

    pub fn reject_delivery_request(
        &self,
        delivery_id: DeliveryId,
        approver: &ActorId,
        reason: &str,
    ) -> ServiceResult<Delivery> {
        let cmd = DeliveryCommand::RejectDelivery(RejectDelivery {
            delivery_id,
            rejected_by: approver.clone(),
            reason: reason.to_string(),
            occurred_at: Utc::now(),
        });
        self.transition("failed to reject delivery", delivery_id, &cmd)
    }

    /// Schedule an approved request. Its lines must be available right now.
    pub fn schedule_delivery(
        &self,
        delivery_id: DeliveryId,
        scheduled_date: NaiveDate,
        notes: Option<String>,
        scheduler: &ActorId,
    ) -> ServiceResult<Delivery> {
        let cmd = DeliveryCommand::ScheduleDelivery(ScheduleDelivery {
            delivery_id,
            scheduled_date,
            notes,
            scheduled_by: scheduler.clone(),
            today: self.ctx.config.today(),
            occurred_at: Utc::now(),
        });

        let delivery = self.ctx.with_retries("failed to schedule delivery", || {
            let mut delivery = self.ctx.delivery(delivery_id)?;
            let decision = self
                .ctx
                .dispatcher
                .decide(&delivery, delivery_id.0, DELIVERY_AGGREGATE, &cmd)?;
            self.ensure_available(delivery.lines())?;

            self.ctx.dispatcher.commit(vec![decision.append])?;
            for ev in &decision.events {
                delivery.apply(ev);
            }
            Ok(delivery)
        })?;

        info!(delivery_id = %delivery_id, scheduled_date = %scheduled_date, "delivery scheduled");
        Ok(delivery)
    }

    /// Confirm a scheduled delivery and deduct its lines from stock.
    ///
    /// All or nothing: if any product is short or no longer active, nothing is
    /// written and the delivery stays SCHEDULED. A concurrent confirmation of the same
    /// delivery makes this attempt conflict; the retry then sees CONFIRMED and
    /// fails with a validation error, so stock is deducted once.
    pub fn confirm_delivery(&self, delivery_id: DeliveryId, confirmer: &ActorId) -> ServiceResult<Delivery> {
        let occurred_at = Utc::now();
        let cmd = DeliveryCommand::ConfirmDelivery(ConfirmDelivery {
            delivery_id,
            confirmed_by: confirmer.clone(),
            occurred_at,
        });
        let reason = format!("delivery {delivery_id} confirmed");

        let delivery = self.ctx.with_retries("failed to confirm delivery", || {
            let mut delivery = self.ctx.delivery(delivery_id)?;
            let decision = self
                .ctx
                .dispatcher
                .decide(&delivery, delivery_id.0, DELIVERY_AGGREGATE, &cmd)?;

            let mut appends = vec![decision.append];
            for (product_id, name, quantity) in merge_lines(delivery.lines()) {
                let product = self.ctx.product(product_id).map_err(|err| match err {
                    DispatchError::Domain(DomainError::NotFound(_)) => {
                        DomainError::not_found(format!("product {name} ({product_id})")).into()
                    }
                    other => other,
                })?;
                if !product.is_active() {
                    return Err(DomainError::validation(format!(
                        "product {} is no longer active",
                        product.name()
                    ))
                    .into());
                }
                let exit = ProductCommand::RecordMovement(RecordMovement {
                    product_id,
                    movement_id: MovementId::new(),
                    movement_type: MovementType::Exit,
                    quantity,
                    performed_by: confirmer.clone(),
                    reason: reason.clone(),
                    occurred_at,
                });
                let movement = self
                    .ctx
                    .dispatcher
                    .decide(&product, product_id.0, PRODUCT_AGGREGATE, &exit)?;
                appends.push(movement.append);
            }

            self.ctx.dispatcher.commit(appends)?;
            for ev in &decision.events {
                delivery.apply(ev);
            }
            Ok(delivery)
        })?;

        info!(
            delivery_id = %delivery_id,
            confirmed_by = %confirmer,
            lines = delivery.lines().len(),
            "delivery confirmed and stock deducted"
        );
        Ok(delivery)
    }

    pub fn cancel_delivery(
        &self,
        delivery_id: DeliveryId,
        canceller: &ActorId,
        reason: &str,
    ) -> ServiceResult<Delivery> {
        let cmd = DeliveryCommand::CancelDelivery(CancelDelivery {
            delivery_id,
            cancelled_by: canceller.clone(),
            reason: reason.to_string(),
            occurred_at: Utc::now(),
        });
        self.transition("failed to cancel delivery", delivery_id, &cmd)
    }

    pub fn get_delivery(&self, delivery_id: DeliveryId) -> ServiceResult<Delivery> {
        self.ctx.delivery(delivery_id).context("failed to load delivery")
    }

    /// Transitions that touch only the delivery stream.
    fn transition(
        &self,
        operation: &'static str,
        delivery_id: DeliveryId,
        cmd: &DeliveryCommand,
    ) -> ServiceResult<Delivery> {
        let delivery = self.ctx.with_retries(operation, || {
            self.ctx
                .dispatcher
                .dispatch(delivery_id.0, DELIVERY_AGGREGATE, cmd, make_delivery)
        })?;
        info!(delivery_id = %delivery_id, status = %delivery.status(), "delivery transitioned");
        Ok(delivery)
    }

    fn ensure_available(&self, lines: &[DeliveryLine]) -> Result<(), DispatchError> {
        let lookup = self.ctx.product_lookup(lines.iter().map(|l| l.product_id))?;
        match first_shortfall(lines, &lookup) {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

/// One exit per product: repeated lines for the same product are summed.
fn merge_lines(lines: &[DeliveryLine]) -> Vec<(ProductId, String, Decimal)> {
    let mut merged: Vec<(ProductId, String, Decimal)> = Vec::new();
    for line in lines {
        match merged.iter_mut().find(|(id, _, _)| *id == line.product_id) {
            Some((_, _, quantity)) => *quantity += line.quantity,
            None => merged.push((line.product_id, line.product_name.clone(), line.quantity)),
        }
    }
    merged
}
