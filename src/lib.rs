// leverage-core: control core for a leveraged position held in a lending market.
// keeps leverage near target with bounded trades on an async swap venue, a
// manipulation resistant smoothed price, and a permissionless emergency unwind.
// all computation is deterministic with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: Amount, Price, Leverage, Fraction, Bps, Clock
//   2.x  position.rs: leverage ratio math, trade notional sizing
//   3.x  oracle.rs: raw feed trait, per block bounded smoothing, circuit breaker
//   4.x  swap.rs: swap lifecycle, price validity check, venue trait + mock
//   5.x  lending.rs: lending market trait + in-memory market
//   6.x  access.rs: callers, owner/operator capabilities, allow-list
//   7.x  config.rs: leverage, execution, incentive, oracle params, presets
//   8.x  engine/: engage, rebalance, iterate, ripcord, settlement, vault, admin
//   9.x  events.rs: state transition events for audit

// core modules
pub mod engine;
pub mod events;
pub mod oracle;
pub mod position;
pub mod swap;
pub mod types;

// collaborator and integration modules
pub mod access;
pub mod config;
pub mod lending;

// re exports for convenience
pub use access::*;
pub use config::*;
pub use engine::*;
pub use events::*;
pub use lending::*;
pub use oracle::*;
pub use position::*;
pub use swap::*;
pub use types::*;
