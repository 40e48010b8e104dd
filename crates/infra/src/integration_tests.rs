//! Integration tests for the full event-sourced pipeline.
//!
//! Tests: Service → CommandDispatcher → EventStore → EventBus → LiveView
//!
//! Verifies:
//! - The delivery lifecycle end to end, including the stock deduction
//! - Confirmation is all-or-nothing across streams
//! - Optimistic concurrency guards duplicate confirmations and racing movements
//! - Live queries push snapshots and survive cancelled subscribers

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use chrono::NaiveDate;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use socialstore_beneficiaries::{BeneficiaryId, BeneficiaryProfile};
    use socialstore_core::ActorId;
    use socialstore_deliveries::{DeliveryId, DeliveryStatus};
    use socialstore_events::{InMemoryEventBus, Subscription};
    use socialstore_kits::KitId;
    use socialstore_stock::{MeasureUnit, MovementType, ProductCategory, ProductId};

    use crate::config::StoreConfig;
    use crate::error::ServiceError;
    use crate::services::{KitDraft, KitItemRequest, ProductDetails};
    use crate::store::{InMemorySocialStore, SocialStore};

    const WAIT: Duration = Duration::from_secs(2);

    struct Fixture {
        store: InMemorySocialStore,
        staff: ActorId,
        student: ActorId,
        beneficiary: BeneficiaryId,
        rice: ProductId,
        beans: ProductId,
        kit: KitId,
    }

    impl Fixture {
        fn tomorrow(&self) -> NaiveDate {
            self.store.config().today().succ_opt().unwrap()
        }

        fn stock(&self, product: ProductId) -> Decimal {
            self.store.stock().get_current_stock(product).unwrap()
        }

        fn scheduled_request(&self) -> DeliveryId {
            let deliveries = self.store.deliveries();
            let id = deliveries
                .request_delivery(self.beneficiary, self.kit, None, &self.student)
                .unwrap()
                .id_typed();
            deliveries.approve_delivery_request(id, &self.staff).unwrap();
            deliveries
                .schedule_delivery(id, self.tomorrow(), None, &self.staff)
                .unwrap();
            id
        }
    }

    fn product(store: &InMemorySocialStore, staff: &ActorId, name: &str, stock: Decimal) -> ProductId {
        let id = store
            .catalog()
            .create_product(
                ProductDetails {
                    name: name.to_string(),
                    category: ProductCategory::Food,
                    unit: MeasureUnit::Kilogram,
                    minimum_stock: dec!(1),
                },
                staff,
            )
            .unwrap()
            .id_typed();
        if stock > Decimal::ZERO {
            store
                .stock()
                .apply_movement(id, MovementType::Entry, stock, staff, "initial donation")
                .unwrap();
        }
        id
    }

    /// Rice 10 kg and beans 5 kg in stock; the basic kit takes 2 kg rice and 1 kg beans.
    fn setup_with(config: StoreConfig) -> Fixture {
        let store = SocialStore::in_memory(config).unwrap();
        let staff = ActorId::new("staff-1");
        let student = ActorId::new("student-42");

        let rice = product(&store, &staff, "Rice", dec!(10));
        let beans = product(&store, &staff, "Beans", dec!(5));
        let kit = store
            .catalog()
            .create_kit(
                KitDraft {
                    name: "Basic".to_string(),
                    description: "weekly basics".to_string(),
                    items: vec![
                        KitItemRequest {
                            product_id: rice,
                            quantity: dec!(2),
                        },
                        KitItemRequest {
                            product_id: beans,
                            quantity: dec!(1),
                        },
                    ],
                },
                &staff,
            )
            .unwrap()
            .id_typed();
        let beneficiary = store
            .catalog()
            .register_beneficiary(student.clone(), "Ana", BeneficiaryProfile::default(), &staff)
            .unwrap()
            .id_typed();

        Fixture {
            store,
            staff,
            student,
            beneficiary,
            rice,
            beans,
            kit,
        }
    }

    fn setup() -> Fixture {
        setup_with(StoreConfig::default())
    }

    /// Next snapshot satisfying `done`; earlier snapshots are skipped.
    fn recv_until<T>(sub: &Subscription<T>, done: impl Fn(&T) -> bool) -> T {
        loop {
            let snapshot = sub.recv_timeout(WAIT).expect("live view stalled");
            if done(&snapshot) {
                return snapshot;
            }
        }
    }

    #[test]
    fn request_approve_schedule_confirm_deducts_each_kit_item() {
        let f = setup();
        let deliveries = f.store.deliveries();

        let requested = deliveries
            .request_delivery(f.beneficiary, f.kit, Some("mornings".to_string()), &f.student)
            .unwrap();
        assert_eq!(requested.status(), DeliveryStatus::PendingApproval);
        let id = requested.id_typed();

        let approved = deliveries.approve_delivery_request(id, &f.staff).unwrap();
        assert_eq!(approved.approval().unwrap().approved_by, f.staff);

        let scheduled = deliveries
            .schedule_delivery(id, f.tomorrow(), None, &f.staff)
            .unwrap();
        assert_eq!(scheduled.scheduled_date(), Some(f.tomorrow()));

        let confirmed = deliveries.confirm_delivery(id, &f.staff).unwrap();
        assert_eq!(confirmed.status(), DeliveryStatus::Confirmed);
        assert_eq!(f.stock(f.rice), dec!(8));
        assert_eq!(f.stock(f.beans), dec!(4));

        let history = f.store.stock().movement_history(f.rice).unwrap();
        let exit = history.last().unwrap();
        assert_eq!(exit.movement_type, MovementType::Exit);
        assert_eq!(exit.quantity, dec!(2));
        assert_eq!(exit.reason, format!("delivery {id} confirmed"));

        assert_eq!(deliveries.get_delivery(id).unwrap(), confirmed);
    }

    #[test]
    fn confirm_with_stock_short_changes_nothing() {
        let f = setup();
        let id = f.scheduled_request();

        // Beans drop to zero after scheduling.
        f.store
            .stock()
            .apply_movement(f.beans, MovementType::Adjustment, dec!(0), &f.staff, "spoiled")
            .unwrap();

        let err = f.store.deliveries().confirm_delivery(id, &f.staff).unwrap_err();

        assert!(matches!(
            err,
            ServiceError::InsufficientStock { ref product, available, requested }
                if product == "Beans" && available == dec!(0) && requested == dec!(1)
        ));
        let delivery = f.store.deliveries().get_delivery(id).unwrap();
        assert_eq!(delivery.status(), DeliveryStatus::Scheduled);
        assert!(delivery.confirmation().is_none());
        assert_eq!(f.stock(f.rice), dec!(10), "rice exit must not be written alone");
        assert_eq!(f.store.stock().movement_history(f.rice).unwrap().len(), 1);
    }

    #[test]
    fn confirm_with_deactivated_product_changes_nothing() {
        let f = setup();
        let id = f.scheduled_request();
        f.store.catalog().deactivate_product(f.beans, &f.staff).unwrap();

        let err = f.store.deliveries().confirm_delivery(id, &f.staff).unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Validation(ref m) if m == "product Beans is no longer active"
        ));
        let delivery = f.store.deliveries().get_delivery(id).unwrap();
        assert_eq!(delivery.status(), DeliveryStatus::Scheduled);
        assert_eq!(f.stock(f.beans), dec!(5));
        assert_eq!(f.stock(f.rice), dec!(10));
    }

    #[test]
    fn reject_without_reason_keeps_request_pending() {
        let f = setup();
        let deliveries = f.store.deliveries();
        let id = deliveries
            .request_delivery(f.beneficiary, f.kit, None, &f.student)
            .unwrap()
            .id_typed();

        let err = deliveries.reject_delivery_request(id, &f.staff, "   ").unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref m) if m.contains("rejection reason")));
        assert_eq!(
            deliveries.get_delivery(id).unwrap().status(),
            DeliveryStatus::PendingApproval
        );

        let rejected = deliveries
            .reject_delivery_request(id, &f.staff, "duplicate request")
            .unwrap();
        assert_eq!(rejected.status(), DeliveryStatus::Rejected);
        assert_eq!(rejected.rejection().unwrap().reason, "duplicate request");
    }

    #[test]
    fn custom_kit_over_stock_names_product_and_available_amount() {
        let f = setup();
        let x = product(&f.store, &f.staff, "Pasta", dec!(3));
        let kits = f.store.custom_kits();

        let mut kit = kits.start_from_scratch();
        kit.add_product(&kits.product_snapshot(x).unwrap(), 5);

        let err = kits.validate(&kit).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Pasta"), "{message}");
        assert!(message.contains('3'), "{message}");
        assert!(matches!(
            kits.submit(f.beneficiary, &kit, "", &f.student),
            Err(ServiceError::InsufficientStock { .. })
        ));
    }

    #[test]
    fn custom_kit_seeded_from_kit_records_base_kit() {
        let f = setup();
        let kits = f.store.custom_kits();

        let mut custom = kits.start_from_kit(f.kit).unwrap();
        custom.update_quantity(f.beans, 0);
        let delivery = kits.submit(f.beneficiary, &custom, "no beans", &f.student).unwrap();

        let source = delivery.kit().unwrap();
        assert!(source.is_custom());
        assert_eq!(source.kit_id(), Some(f.kit));
        assert_eq!(source.kit_name_label(), "Basic");
        assert_eq!(delivery.lines().len(), 1);
        let notes = delivery.request().unwrap().request_notes.clone().unwrap();
        assert!(notes.starts_with("Custom kit based on Basic:"));
    }

    #[test]
    fn collaborator_creates_scheduled_delivery_directly() {
        let f = setup();
        let delivery = f
            .store
            .deliveries()
            .create_delivery(f.beneficiary, f.kit, f.tomorrow(), Some("door 3".to_string()), &f.staff)
            .unwrap();

        assert_eq!(delivery.status(), DeliveryStatus::Scheduled);
        assert_eq!(delivery.beneficiary_name(), "Ana");
        assert_eq!(delivery.kit().unwrap().kit_id(), Some(f.kit));
        assert_eq!(delivery.lines().len(), 2);
        assert_eq!(f.stock(f.rice), dec!(10), "nothing is reserved before confirmation");
    }

    #[test]
    fn create_delivery_preconditions() {
        let f = setup();
        let deliveries = f.store.deliveries();
        let yesterday = f.store.config().today().pred_opt().unwrap();

        let err = deliveries
            .create_delivery(f.beneficiary, f.kit, yesterday, None, &f.staff)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref m) if m.contains("in the past")));

        // Rice short: the kit is unavailable.
        f.store
            .stock()
            .apply_movement(f.rice, MovementType::Adjustment, dec!(1), &f.staff, "recount")
            .unwrap();
        let err = deliveries
            .create_delivery(f.beneficiary, f.kit, f.tomorrow(), None, &f.staff)
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientStock { .. }));

        f.store
            .catalog()
            .deactivate_kit(f.kit, &f.staff)
            .unwrap();
        let err = deliveries
            .request_delivery(f.beneficiary, f.kit, None, &f.student)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref m) if m.contains("not active")));
    }

    #[test]
    fn inactive_beneficiary_cannot_request() {
        let f = setup();
        f.store
            .catalog()
            .deactivate_beneficiary(f.beneficiary, None, &f.staff)
            .unwrap();

        let err = f
            .store
            .deliveries()
            .request_delivery(f.beneficiary, f.kit, None, &f.student)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let missing = BeneficiaryId::new(socialstore_core::AggregateId::new());
        let err = f
            .store
            .deliveries()
            .request_delivery(missing, f.kit, None, &f.student)
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn scheduling_requires_available_lines() {
        let f = setup();
        let deliveries = f.store.deliveries();
        let id = deliveries
            .request_delivery(f.beneficiary, f.kit, None, &f.student)
            .unwrap()
            .id_typed();
        deliveries.approve_delivery_request(id, &f.staff).unwrap();
        f.store
            .stock()
            .apply_movement(f.rice, MovementType::Exit, dec!(10), &f.staff, "expired")
            .unwrap();

        let err = deliveries
            .schedule_delivery(id, f.tomorrow(), None, &f.staff)
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientStock { .. }));
        assert_eq!(deliveries.get_delivery(id).unwrap().status(), DeliveryStatus::Approved);
    }

    #[test]
    fn terminal_deliveries_cannot_be_cancelled() {
        let f = setup();
        let deliveries = f.store.deliveries();
        let id = f.scheduled_request();
        deliveries.confirm_delivery(id, &f.staff).unwrap();

        let err = deliveries
            .cancel_delivery(id, &f.student, "changed my mind")
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(deliveries.get_delivery(id).unwrap().status(), DeliveryStatus::Confirmed);

        let other = f.scheduled_request();
        let cancelled = deliveries
            .cancel_delivery(other, &f.student, "travelling")
            .unwrap();
        assert_eq!(cancelled.status(), DeliveryStatus::Cancelled);
        assert_eq!(f.stock(f.rice), dec!(8), "only the confirmed delivery deducted stock");
    }

    #[test]
    fn concurrent_duplicate_confirmation_deducts_once() {
        let f = Arc::new(setup());
        let id = f.scheduled_request();
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let f = Arc::clone(&f);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    f.store.deliveries().confirm_delivery(id, &f.staff)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(ServiceError::Validation(m)) if m.contains("CONFIRMED")))
        );
        assert_eq!(f.stock(f.rice), dec!(8));
        assert_eq!(f.stock(f.beans), dec!(4));
    }

    #[test]
    fn racing_movements_are_all_applied_through_retries() {
        let f = Arc::new(setup_with(StoreConfig::default().with_max_conflict_retries(100)));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let f = Arc::clone(&f);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    f.store
                        .stock()
                        .apply_movement(f.rice, MovementType::Exit, dec!(1), &f.staff, "walk-in")
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }

        assert_eq!(f.stock(f.rice), dec!(2));
        assert_eq!(f.store.stock().movement_history(f.rice).unwrap().len(), 9);
    }

    #[test]
    fn live_query_pushes_snapshots_and_survives_dropped_subscribers() {
        let f = setup();
        let views = f.store.views();

        let pending = views.watch_deliveries_by_status(DeliveryStatus::PendingApproval);
        let mine = views.watch_deliveries_for_beneficiary(f.beneficiary);
        assert!(pending.recv_timeout(WAIT).unwrap().is_empty());
        assert!(mine.recv_timeout(WAIT).unwrap().is_empty());

        let id = f
            .store
            .deliveries()
            .request_delivery(f.beneficiary, f.kit, None, &f.student)
            .unwrap()
            .id_typed();
        assert_eq!(pending.recv_timeout(WAIT).unwrap().len(), 1);
        assert_eq!(mine.recv_timeout(WAIT).unwrap().len(), 1);

        drop(pending);
        f.store.deliveries().approve_delivery_request(id, &f.staff).unwrap();

        let rows = mine.recv_timeout(WAIT).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status(), DeliveryStatus::Approved);
    }

    #[test]
    fn low_stock_and_movement_views_follow_the_ledger() {
        let f = setup();
        let views = f.store.views();

        // The views may still be catching up on the fixture's events.
        let low = views.watch_low_stock();
        let rice_moves = views.watch_movements(f.rice);
        recv_until(&low, |rows| rows.iter().all(|p| p.id_typed() != f.rice));
        recv_until(&rice_moves, |moves| moves.len() == 1);

        f.store
            .stock()
            .apply_movement(f.rice, MovementType::Adjustment, dec!(1), &f.staff, "recount")
            .unwrap();

        let moves = recv_until(&rice_moves, |moves| moves.len() == 2);
        assert_eq!(moves[1].stock_after, dec!(1));
        recv_until(&low, |rows| rows.iter().any(|p| p.id_typed() == f.rice));
        assert!(views.low_stock_products().iter().any(|p| p.id_typed() == f.rice));
    }

    #[test]
    fn views_rebuild_from_existing_history() {
        let f = setup();
        let store = Arc::clone(f.store.event_store());

        let rebuilt = SocialStore::new(store, Arc::new(InMemoryEventBus::new()), StoreConfig::default()).unwrap();

        assert_eq!(rebuilt.views().products().len(), 2);
        assert_eq!(rebuilt.views().kits().len(), 1);
        assert_eq!(rebuilt.views().beneficiaries().len(), 1);
        assert_eq!(rebuilt.stock().get_current_stock(f.rice).unwrap(), dec!(10));
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 16, ..ProptestConfig::default() })]

        #[test]
        fn custom_kit_from_kit_agrees_with_kit_availability(
            rice_stock in 0u32..6,
            beans_stock in 0u32..6,
            rice_need in 1u32..5,
            beans_need in 1u32..5,
        ) {
            let store = SocialStore::in_memory(StoreConfig::default()).unwrap();
            let staff = ActorId::new("staff-1");
            let rice = product(&store, &staff, "Rice", Decimal::from(rice_stock));
            let beans = product(&store, &staff, "Beans", Decimal::from(beans_stock));
            let kit = store
                .catalog()
                .create_kit(
                    KitDraft {
                        name: "Prop".to_string(),
                        description: String::new(),
                        items: vec![
                            KitItemRequest { product_id: rice, quantity: Decimal::from(rice_need) },
                            KitItemRequest { product_id: beans, quantity: Decimal::from(beans_need) },
                        ],
                    },
                    &staff,
                )
                .unwrap()
                .id_typed();

            let available = store.availability().check_kit(kit).unwrap();
            let custom = store.custom_kits().start_from_kit(kit).unwrap();
            let valid = store.custom_kits().validate(&custom).is_ok();

            prop_assert_eq!(available, valid);
            prop_assert_eq!(available, rice_stock >= rice_need && beans_stock >= beans_need);
        }
    }
}
