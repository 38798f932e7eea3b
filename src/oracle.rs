//! Price smoothing oracle.
//!
//! Turns a raw price feed into a smoothed price that moves toward spot by a bounded
//! fraction per block. A single block spike cannot drag the smoothed price with it,
//! and a large gap between the two trips a circuit breaker that only an operator reset
//! clears.

use crate::access::OperatorCap;
use crate::types::{BlockNumber, Clock, Fraction, Price, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single reading from a raw feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceReading {
    pub price: Price,
    pub updated_at: Timestamp,
}

impl PriceReading {
    pub fn new(price: Price, updated_at: Timestamp) -> Self {
        Self { price, updated_at }
    }

    pub fn is_stale(&self, now: Timestamp, max_staleness_secs: u64) -> bool {
        now.secs_since(self.updated_at) > max_staleness_secs
    }
}

/// Raw price source. Implement this for a specific oracle network.
pub trait PriceFeed {
    fn latest_price(&self) -> PriceReading;
}

/// Settable feed for tests and simulation.
#[derive(Debug, Clone)]
pub struct MockPriceFeed {
    reading: PriceReading,
}

impl MockPriceFeed {
    pub fn new(price: Price, updated_at: Timestamp) -> Self {
        Self {
            reading: PriceReading::new(price, updated_at),
        }
    }

    pub fn set_price(&mut self, price: Price, updated_at: Timestamp) {
        self.reading = PriceReading::new(price, updated_at);
    }
}

impl PriceFeed for MockPriceFeed {
    fn latest_price(&self) -> PriceReading {
        self.reading
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleParams {
    /// Largest fractional step per block the smoothed price may take toward spot.
    pub accrual_rate_per_block: Fraction,
    /// Largest tolerated `|twap - spot| / spot` before smoothing is blocked.
    pub circuit_breaker_threshold: Fraction,
    pub max_staleness_secs: u64,
}

impl Default for OracleParams {
    fn default() -> Self {
        Self {
            accrual_rate_per_block: Fraction::new_unchecked(Decimal::new(1, 2)), // 1% per block
            circuit_breaker_threshold: Fraction::new_unchecked(Decimal::new(5, 2)), // 5%
            max_staleness_secs: 3_600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle stale: last update {updated_at:?}, max staleness {max_staleness_secs}s")]
    Stale {
        updated_at: Timestamp,
        max_staleness_secs: u64,
    },

    #[error("Oracle circuit breaker tripped: twap {twap}, spot {spot}")]
    CircuitBreakerTripped { twap: Price, spot: Price },
}

/// Outcome of a smoothing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwapUpdate {
    pub twap: Price,
    pub spot: Price,
    pub blocks_elapsed: u64,
    /// The breaker went from clear to tripped on this update.
    pub newly_tripped: bool,
}

#[derive(Debug, Clone)]
pub struct SmoothingOracle<F> {
    feed: F,
    params: OracleParams,
    spot: PriceReading,
    twap: Price,
    last_update_block: BlockNumber,
    breaker_tripped: bool,
}

impl<F: PriceFeed> SmoothingOracle<F> {
    /// Seeds the smoothed price with the current spot.
    pub fn new(feed: F, params: OracleParams, now: Clock) -> Result<Self, OracleError> {
        let spot = read_fresh(&feed, &params, now.time)?;
        Ok(Self {
            feed,
            params,
            spot,
            twap: spot.price,
            last_update_block: now.block,
            breaker_tripped: false,
        })
    }

    pub fn spot_price(&self, now: Timestamp) -> Result<Price, OracleError> {
        read_fresh(&self.feed, &self.params, now).map(|r| r.price)
    }

    /// Last spot value recorded by an update.
    pub fn last_spot(&self) -> PriceReading {
        self.spot
    }

    pub fn twap_price(&self) -> Price {
        self.twap
    }

    pub fn safe_twap_price(&self) -> Result<Price, OracleError> {
        if self.breaker_tripped {
            return Err(OracleError::CircuitBreakerTripped {
                twap: self.twap,
                spot: self.spot.price,
            });
        }
        Ok(self.twap)
    }

    pub fn is_breaker_tripped(&self) -> bool {
        self.breaker_tripped
    }

    pub fn last_update_block(&self) -> BlockNumber {
        self.last_update_block
    }

    pub fn params(&self) -> &OracleParams {
        &self.params
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    pub fn feed_mut(&mut self) -> &mut F {
        &mut self.feed
    }

    /// Moves the smoothed price toward spot. No-op within a block.
    pub fn update_twap(&mut self, now: Clock) -> Result<TwapUpdate, OracleError> {
        let blocks_elapsed = now.block.blocks_since(self.last_update_block);
        if blocks_elapsed == 0 {
            return Ok(TwapUpdate {
                twap: self.twap,
                spot: self.spot.price,
                blocks_elapsed: 0,
                newly_tripped: false,
            });
        }

        let spot = read_fresh(&self.feed, &self.params, now.time)?;
        self.spot = spot;
        self.last_update_block = now.block;

        // tripped: spot is tracked but the smoothed price stays frozen until reset
        if self.breaker_tripped {
            return Ok(TwapUpdate {
                twap: self.twap,
                spot: spot.price,
                blocks_elapsed,
                newly_tripped: false,
            });
        }

        self.twap = step_toward(
            self.twap,
            spot.price,
            self.params.accrual_rate_per_block,
            blocks_elapsed,
        );

        let divergence = self.twap.deviation_from(spot.price);
        let newly_tripped = divergence > self.params.circuit_breaker_threshold.value();
        if newly_tripped {
            self.breaker_tripped = true;
            tracing::warn!(
                twap = %self.twap,
                spot = %spot.price,
                %divergence,
                "oracle circuit breaker tripped"
            );
        }

        Ok(TwapUpdate {
            twap: self.twap,
            spot: spot.price,
            blocks_elapsed,
            newly_tripped,
        })
    }

    /// Forces the smoothed price to spot and clears the breaker.
    pub fn reset_to_spot(&mut self, _operator: &OperatorCap, now: Clock) -> Result<Price, OracleError> {
        let spot = read_fresh(&self.feed, &self.params, now.time)?;
        self.spot = spot;
        self.twap = spot.price;
        self.last_update_block = now.block;
        self.breaker_tripped = false;
        Ok(self.twap)
    }
}

fn read_fresh<F: PriceFeed>(
    feed: &F,
    params: &OracleParams,
    now: Timestamp,
) -> Result<PriceReading, OracleError> {
    let reading = feed.latest_price();
    if reading.is_stale(now, params.max_staleness_secs) {
        return Err(OracleError::Stale {
            updated_at: reading.updated_at,
            max_staleness_secs: params.max_staleness_secs,
        });
    }
    Ok(reading)
}

/// One bounded step from `current` toward `target`, never past it.
pub fn step_toward(current: Price, target: Price, rate: Fraction, blocks: u64) -> Price {
    let max_move = (rate.value() * Decimal::from(blocks)).min(Decimal::ONE);
    let value = if target > current {
        (current.value() * (Decimal::ONE + max_move)).min(target.value())
    } else {
        (current.value() * (Decimal::ONE - max_move)).max(target.value())
    };
    Price::new_unchecked(value)
}
