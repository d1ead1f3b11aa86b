//! Transport abstraction (spec component C3): connect, upgrade to
//! TLS in place, shut down.

pub mod mock;
pub mod net;

pub use mock::MockStream;
pub use net::{ClientTlsParameters, Connector, NetworkStream};
