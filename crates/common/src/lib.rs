/**
 * Account identity and the account master key
 *  as stored on this device.
 */
pub mod account;
/**
 * Device pairing state machine.
 *  - Primary and secondary flows
 *  - Session persistence and resumption
 */
pub mod activation;
/**
 * Clipboard content model. Content is
 *  always encrypted under the account key
 *  before it leaves the device.
 */
pub mod clipboard;
pub mod clock;
/**
 * Cryptographic types and operations.
 *  - JWK import/export
 *  - AES-256-GCM payload encryption
 *  - P-256 key agreement
 *  - Pairing hashes and link codes
 */
pub mod crypto;
/**
 * The relay server both devices talk
 *  through, plus an in-memory stand-in.
 */
pub mod relay;
/**
 * Local key-value settings storage.
 */
pub mod settings;
/**
 * Moving the account key to a newly
 *  paired device over the channel key.
 */
pub mod transport;

pub mod prelude {
    pub use crate::account::{Account, AccountError};
    pub use crate::activation::{
        format_code, normalize_code, ActivationData, ActivationError, Activator, LinkStatus,
        PairingState, Role,
    };
    pub use crate::clipboard::{ClipboardContent, ClipboardItem, EncryptedClipboardItem};
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::crypto::{EncryptedPayload, Jwk, KeyPayload, SymmetricKey};
    pub use crate::relay::{Relay, RelayError};
    pub use crate::settings::{SettingsError, SettingsStore};
    pub use crate::transport::AccountAuth;
}
