//! Time-ordered 64-bit id allocation.
//!
//! Ids are bit-packed, Snowflake style:
//!
//! ```text
//!  63        52 51                              12 11         0
//! +------------+----------------------------------+------------+
//! | instance   | issued_at (seconds since epoch)  | sequence   |
//! | 12 bits    | 40 bits                          | 12 bits    |
//! +------------+----------------------------------+------------+
//! ```
//!
//! The sequence comes from an atomic counter in the shared [`TokenStore`],
//! keyed per instance as `auto_id_{instance}`.

use std::sync::Arc;

use crate::TokenError;
use crate::token::storage::TokenStore;

/// Largest valid instance id (12 bits).
pub const MAX_INSTANCE_ID: u16 = 0xFFF;

/// Largest sequence value (12 bits). Reaching it resets the counter.
pub const MAX_SEQUENCE: u64 = 0xFFF;

const INSTANCE_SHIFT: u32 = 52;
const TIME_SHIFT: u32 = 12;
const TIME_MASK: u64 = (1 << 40) - 1;

/// The fields packed into an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParts {
    pub instance_id: u16,
    pub issued_at: u64,
    pub sequence: u64,
}

/// Allocates ids for one process/shard.
pub struct IdGenerator {
    instance_id: u16,
    storage: Arc<dyn TokenStore>,
}

impl IdGenerator {
    /// Creates a generator for `instance_id` backed by `storage`.
    ///
    /// Fails if `instance_id` does not fit in 12 bits.
    pub fn new(instance_id: u16, storage: Arc<dyn TokenStore>) -> Result<Self, TokenError> {
        if instance_id > MAX_INSTANCE_ID {
            return Err(TokenError::ConfigError(format!(
                "instance_id {instance_id} exceeds {MAX_INSTANCE_ID}"
            )));
        }
        Ok(Self {
            instance_id,
            storage,
        })
    }

    pub fn instance_id(&self) -> u16 {
        self.instance_id
    }

    /// Store key of this instance's sequence counter.
    pub fn counter_key(&self) -> String {
        format!("auto_id_{}", self.instance_id)
    }

    /// Allocates the next id for time `now`.
    ///
    /// Increments the shared counter once. When the returned sequence reaches
    /// [`MAX_SEQUENCE`] the counter is deleted so the next call starts a new
    /// cycle at 1. The reset is a separate store call: an allocation racing
    /// with it within the same second may reuse a sequence number.
    pub async fn allocate(&self, now: u64) -> Result<u64, TokenError> {
        let key = self.counter_key();
        let sequence = self.storage.increment(&key).await?;

        if sequence >= MAX_SEQUENCE {
            self.storage.forget(&key).await?;
            tracing::info!(instance_id = self.instance_id, "Id sequence wrapped");
        }

        Ok(Self::compose(self.instance_id, now, sequence))
    }

    /// Packs the id fields. Out-of-range values are truncated to their bit width.
    pub fn compose(instance_id: u16, issued_at: u64, sequence: u64) -> u64 {
        (u64::from(instance_id & MAX_INSTANCE_ID) << INSTANCE_SHIFT)
            | ((issued_at & TIME_MASK) << TIME_SHIFT)
            | (sequence & MAX_SEQUENCE)
    }

    /// Unpacks an id produced by [`IdGenerator::compose`].
    pub fn decompose(id: u64) -> IdParts {
        IdParts {
            instance_id: (id >> INSTANCE_SHIFT) as u16 & MAX_INSTANCE_ID,
            issued_at: (id >> TIME_SHIFT) & TIME_MASK,
            sequence: id & MAX_SEQUENCE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    const NOW: u64 = 1_700_000_000;

    fn generator(instance_id: u16) -> (IdGenerator, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let generator = IdGenerator::new(instance_id, storage.clone()).unwrap();
        (generator, storage)
    }

    #[test]
    fn test_compose_layout() {
        let id = IdGenerator::compose(1, NOW, 2);
        assert_eq!(id, (1u64 << 52) | (NOW << 12) | 2);

        let parts = IdGenerator::decompose(id);
        assert_eq!(
            parts,
            IdParts {
                instance_id: 1,
                issued_at: NOW,
                sequence: 2
            }
        );
    }

    #[test]
    fn test_compose_extremes() {
        let id = IdGenerator::compose(MAX_INSTANCE_ID, TIME_MASK, MAX_SEQUENCE);
        assert_eq!(id, u64::MAX);
        assert_eq!(IdGenerator::decompose(0).sequence, 0);
    }

    #[test]
    fn test_instance_id_range() {
        let storage: Arc<dyn TokenStore> = Arc::new(MemoryStorage::new());
        assert!(IdGenerator::new(MAX_INSTANCE_ID, storage.clone()).is_ok());
        assert!(matches!(
            IdGenerator::new(4096, storage),
            Err(TokenError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_sequence_strictly_increasing() -> Result<(), TokenError> {
        let (generator, _) = generator(3);
        let mut previous = 0;
        for expected in 1..=100u64 {
            let id = generator.allocate(NOW).await?;
            let parts = IdGenerator::decompose(id);
            assert_eq!(parts.instance_id, 3);
            assert_eq!(parts.issued_at, NOW);
            assert_eq!(parts.sequence, expected);
            assert!(id > previous);
            previous = id;
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_sequence_wraps_at_max() -> Result<(), TokenError> {
        let (generator, storage) = generator(1);

        // Fast-forward the counter to just below the maximum
        storage
            .put(
                &generator.counter_key(),
                &(MAX_SEQUENCE - 1).to_string(),
                std::time::Duration::from_secs(3600),
            )
            .await?;

        let at_max = generator.allocate(NOW).await?;
        assert_eq!(IdGenerator::decompose(at_max).sequence, MAX_SEQUENCE);

        // Counter was reset, the next cycle starts at 1
        assert_eq!(storage.get(&generator.counter_key()).await?, None);
        let wrapped = generator.allocate(NOW).await?;
        assert_eq!(IdGenerator::decompose(wrapped).sequence, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_instances_use_separate_counters() -> Result<(), TokenError> {
        let storage: Arc<dyn TokenStore> = Arc::new(MemoryStorage::new());
        let a = IdGenerator::new(1, storage.clone())?;
        let b = IdGenerator::new(2, storage)?;

        let id_a = a.allocate(NOW).await?;
        let id_b = b.allocate(NOW).await?;
        assert_eq!(IdGenerator::decompose(id_a).sequence, 1);
        assert_eq!(IdGenerator::decompose(id_b).sequence, 1);
        assert_ne!(id_a, id_b);

        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_allocations_are_distinct() -> Result<(), TokenError> {
        let (generator, _) = generator(1);
        let generator = Arc::new(generator);

        let first = {
            let g = Arc::clone(&generator);
            tokio::spawn(async move { g.allocate(NOW).await })
        };
        let second = {
            let g = Arc::clone(&generator);
            tokio::spawn(async move { g.allocate(NOW).await })
        };

        let mut ids = vec![first.await.unwrap()?, second.await.unwrap()?];
        ids.sort_unstable();
        assert_eq!(
            ids,
            vec![
                IdGenerator::compose(1, NOW, 1),
                IdGenerator::compose(1, NOW, 2)
            ]
        );

        Ok(())
    }
}
