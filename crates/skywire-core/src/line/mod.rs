//! Telemetry line protocol.
//!
//! Producers emit one newline-terminated text line per measurement:
//!
//! ```text
//! D0:<int>cm
//! D1:<int>cm
//! F:X<int> Y<int> M_X<f.3> M_Y<f.3> D<f.2> Q<int>
//! I:A<int>,<int>,<int> G<int>,<int>,<int>
//! G:<f.6>,<f.6> A<f.1> S<int>
//! ```
//!
//! [`decode`] turns a line into a typed [`Record`]; [`encode`] formats a
//! flight-controller message into a line for the producer side.

mod decode;
mod encode;
mod types;

pub use decode::{ACK_PREFIX, decode};
pub use encode::{encode, format_record};
pub use types::*;
