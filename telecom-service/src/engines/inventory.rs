//! MSISDN pool management.

use crate::error::TelecomError;
use crate::models::{ListNumbersFilter, NewPhoneNumber, NumberStatus, PhoneNumber, ReservationFilter};
use crate::services::{record_number_operation, TelecomStore};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct InventoryAllocator {
    store: Arc<dyn TelecomStore>,
}

impl InventoryAllocator {
    pub fn new(store: Arc<dyn TelecomStore>) -> Self {
        Self { store }
    }

    /// Reserve the first available number matching `filter`.
    #[instrument(skip(self))]
    pub async fn reserve_number(
        &self,
        filter: &ReservationFilter,
    ) -> Result<PhoneNumber, TelecomError> {
        match self.store.claim_available_number(filter).await? {
            Some(number) => {
                record_number_operation("reserve", "ok");
                info!(
                    number_id = %number.number_id,
                    phone_number = %number.phone_number,
                    "Number reserved"
                );
                Ok(number)
            }
            None => {
                record_number_operation("reserve", "unavailable");
                match &filter.specific_number {
                    Some(requested) => Err(TelecomError::NumberUnavailable(requested.clone())),
                    None => Err(TelecomError::NoAvailableNumber),
                }
            }
        }
    }

    /// `reserved -> active`, linking the number to its subscription.
    #[instrument(skip(self))]
    pub async fn activate_number(
        &self,
        number_id: Uuid,
        subscription_id: Uuid,
    ) -> Result<PhoneNumber, TelecomError> {
        let activated = self
            .store
            .transition_number(
                number_id,
                &[NumberStatus::Reserved],
                NumberStatus::Active,
                Some(subscription_id),
            )
            .await?;

        match activated {
            Some(number) => {
                record_number_operation("activate", "ok");
                info!(phone_number = %number.phone_number, "Number activated");
                Ok(number)
            }
            None => {
                record_number_operation("activate", "rejected");
                let current = self
                    .store
                    .get_phone_number(number_id)
                    .await?
                    .ok_or(TelecomError::NumberNotFound(number_id))?;
                Err(TelecomError::InvalidStateTransition {
                    entity: "phone number",
                    from: current.status.as_str().to_string(),
                    to: NumberStatus::Active.as_str().to_string(),
                })
            }
        }
    }

    /// Return a number to the pool. A number still backing an open
    /// subscription is refused; cancelling the subscription releases it.
    #[instrument(skip(self))]
    pub async fn release_number(&self, number_id: Uuid) -> Result<PhoneNumber, TelecomError> {
        let current = self
            .store
            .get_phone_number(number_id)
            .await?
            .ok_or(TelecomError::NumberNotFound(number_id))?;

        if let Some(holder) = self.store.find_open_subscription_for_number(number_id).await? {
            record_number_operation("release", "rejected");
            warn!(
                number_id = %number_id,
                subscription_id = %holder.subscription_id,
                "Number is held by an open subscription"
            );
            return Err(TelecomError::InvalidStateTransition {
                entity: "phone number",
                from: current.status.as_str().to_string(),
                to: NumberStatus::Available.as_str().to_string(),
            });
        }

        // Only from the observed status, so a concurrent activation wins.
        let released = self
            .store
            .transition_number(number_id, &[current.status], NumberStatus::Available, None)
            .await?;

        match released {
            Some(number) => {
                record_number_operation("release", "ok");
                info!(phone_number = %number.phone_number, "Number released");
                Ok(number)
            }
            None => {
                record_number_operation("release", "rejected");
                let latest = self
                    .store
                    .get_phone_number(number_id)
                    .await?
                    .ok_or(TelecomError::NumberNotFound(number_id))?;
                Err(TelecomError::InvalidStateTransition {
                    entity: "phone number",
                    from: latest.status.as_str().to_string(),
                    to: NumberStatus::Available.as_str().to_string(),
                })
            }
        }
    }

    /// `reserved -> available` for a reservation this allocator handed out.
    async fn cancel_reservation(&self, number_id: Uuid) -> Result<(), TelecomError> {
        self.store
            .transition_number(
                number_id,
                &[NumberStatus::Reserved],
                NumberStatus::Available,
                None,
            )
            .await?;
        record_number_operation("release", "ok");
        Ok(())
    }

    /// Reserve a number and hand it to `step`. If the step fails the number
    /// goes back to `available` and the step's error is returned.
    pub async fn reserve_with<T, F, Fut>(
        &self,
        filter: &ReservationFilter,
        step: F,
    ) -> Result<T, TelecomError>
    where
        F: FnOnce(PhoneNumber) -> Fut,
        Fut: Future<Output = Result<T, TelecomError>>,
    {
        let number = self.reserve_number(filter).await?;
        let number_id = number.number_id;

        match step(number).await {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(number_id = %number_id, error = %err, "Step failed, releasing reservation");
                if let Err(release_err) = self.cancel_reservation(number_id).await {
                    error!(
                        number_id = %number_id,
                        error = %release_err,
                        "Failed to release reservation"
                    );
                }
                Err(err)
            }
        }
    }

    /// Seed the pool. Entries are inserted in order; a duplicate stops the
    /// batch with the earlier entries kept.
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub async fn add_numbers(
        &self,
        entries: &[NewPhoneNumber],
    ) -> Result<Vec<PhoneNumber>, TelecomError> {
        for entry in entries {
            if entry.phone_number.trim().is_empty() || entry.region_code.trim().is_empty() {
                return Err(TelecomError::InvalidInput(
                    "phone_number and region_code are required".to_string(),
                ));
            }
        }

        let mut added = Vec::with_capacity(entries.len());
        for entry in entries {
            added.push(self.store.insert_phone_number(entry).await?);
        }

        record_number_operation("add", "ok");
        info!(count = added.len(), "Numbers added to pool");
        Ok(added)
    }

    pub async fn list_numbers(
        &self,
        filter: &ListNumbersFilter,
    ) -> Result<Vec<PhoneNumber>, TelecomError> {
        self.store.list_phone_numbers(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NumberTier;
    use crate::services::InMemoryStore;

    async fn seeded(numbers: &[(&str, &str, NumberTier)]) -> (Arc<InMemoryStore>, InventoryAllocator) {
        let store = Arc::new(InMemoryStore::new());
        let inventory = InventoryAllocator::new(store.clone());
        let entries: Vec<NewPhoneNumber> = numbers
            .iter()
            .map(|(phone, region, tier)| NewPhoneNumber {
                phone_number: phone.to_string(),
                tier: *tier,
                region_code: region.to_string(),
            })
            .collect();
        inventory.add_numbers(&entries).await.unwrap();
        (store, inventory)
    }

    #[tokio::test]
    async fn reserve_filters_by_region_and_tier() {
        let (_, inventory) = seeded(&[
            ("+919000000001", "IN-MH", NumberTier::Standard),
            ("+919000000002", "IN-KA", NumberTier::Gold),
            ("+919000000003", "IN-KA", NumberTier::Standard),
        ])
        .await;

        let number = inventory
            .reserve_number(&ReservationFilter {
                region_code: Some("IN-KA".to_string()),
                tier: Some(NumberTier::Standard),
                specific_number: None,
            })
            .await
            .unwrap();
        assert_eq!(number.phone_number, "+919000000003");
    }

    #[tokio::test]
    async fn specific_number_must_be_available() {
        let (_, inventory) = seeded(&[("+919000000001", "IN-MH", NumberTier::Standard)]).await;
        let filter = ReservationFilter {
            specific_number: Some("+919000000001".to_string()),
            ..Default::default()
        };

        inventory.reserve_number(&filter).await.unwrap();
        let err = inventory.reserve_number(&filter).await.unwrap_err();
        assert!(matches!(err, TelecomError::NumberUnavailable(n) if n == "+919000000001"));
    }

    #[tokio::test]
    async fn empty_pool_reports_no_available_number() {
        let (_, inventory) = seeded(&[]).await;
        let err = inventory
            .reserve_number(&ReservationFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TelecomError::NoAvailableNumber));
    }

    #[tokio::test]
    async fn activate_requires_reserved() {
        let (store, inventory) = seeded(&[("+919000000001", "IN-MH", NumberTier::Standard)]).await;
        let number = store
            .find_phone_number("+919000000001")
            .await
            .unwrap()
            .unwrap();

        let err = inventory
            .activate_number(number.number_id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, TelecomError::InvalidStateTransition { ref from, .. } if from == "available"));

        let missing = inventory
            .activate_number(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(missing, TelecomError::NumberNotFound(_)));
    }

    #[tokio::test]
    async fn reserve_with_releases_on_failure() {
        let (store, inventory) = seeded(&[("+919000000001", "IN-MH", NumberTier::Standard)]).await;

        let result: Result<(), TelecomError> = inventory
            .reserve_with(&ReservationFilter::default(), |number| async move {
                assert_eq!(number.status, NumberStatus::Reserved);
                Err(TelecomError::InvalidInput("cart rejected".to_string()))
            })
            .await;
        assert!(matches!(result, Err(TelecomError::InvalidInput(_))));

        let number = store
            .find_phone_number("+919000000001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(number.status, NumberStatus::Available);
    }

    #[tokio::test]
    async fn reserve_with_keeps_reservation_on_success() {
        let (store, inventory) = seeded(&[("+919000000001", "IN-MH", NumberTier::Standard)]).await;

        let phone = inventory
            .reserve_with(&ReservationFilter::default(), |number| async move {
                Ok(number.phone_number)
            })
            .await
            .unwrap();

        let number = store.find_phone_number(&phone).await.unwrap().unwrap();
        assert_eq!(number.status, NumberStatus::Reserved);
    }

    #[tokio::test]
    async fn duplicate_seed_is_rejected() {
        let (_, inventory) = seeded(&[("+919000000001", "IN-MH", NumberTier::Standard)]).await;
        let err = inventory
            .add_numbers(&[NewPhoneNumber {
                phone_number: "+919000000001".to_string(),
                tier: NumberTier::Gold,
                region_code: "IN-MH".to_string(),
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, TelecomError::DuplicateNumber(_)));
    }
}
