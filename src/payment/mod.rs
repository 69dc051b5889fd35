//! Fee collection: amount parsing, address validation and the payment hand-off.
//!
//! Nothing here signs or broadcasts a transaction. The initiator validates the
//! request and hands it to the visitor's wallet connection.

pub mod address;
pub mod amount;
pub mod initiator;

pub use amount::{format_fee, parse_ether};
pub use initiator::{PaymentInitiator, PaymentOutcome, PaymentRequest, WalletConnectPayment};
