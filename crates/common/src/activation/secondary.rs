use crate::account::{self, Account};
use crate::crypto::{derive_shared_key, AgreementPublicKey, KeyPair};
use crate::relay::RelayError;
use crate::transport::{self, TransportError};

use super::code::normalize_code;
use super::{Activator, ActivationData, ActivationError, Role, ACTIVATION_PREFIX};

impl Activator {
    /// Join the account of the device showing `access_code`
    ///
    /// The code is normalized first. Connecting again with the code of the
    /// stored secondary session resumes it.
    pub async fn connect(&self, access_code: &str) -> Result<ActivationData, ActivationError> {
        let code = normalize_code(access_code);
        if code.is_empty() {
            return Err(ActivationError::EmptyAccessCode);
        }

        if let Some(existing) = self.resume().await? {
            if existing.role() == Role::Secondary && existing.access_code() == code {
                tracing::debug!(code = %code, "resuming secondary pairing session");
                return Ok(existing);
            }
            return Err(ActivationError::SessionInProgress(existing.role()));
        }

        let generation = self.generation();
        let pair = KeyPair::generate();
        let own_payload = self.key_payload(&pair.public);

        let received = match self.relay.exchange_link_key(&code, &own_payload).await {
            Ok(payload) => payload,
            Err(RelayError::NotFound) => return Err(ActivationError::UnknownAccessCode),
            Err(err) => return Err(err.into()),
        };

        let peer = AgreementPublicKey::from_jwk(&received.key)?;
        let shared_key = derive_shared_key(&pair.private, &peer)?;
        let data = ActivationData::secondary(
            code,
            pair.private,
            peer,
            shared_key,
            received.hash(),
            own_payload.hash(),
        );

        self.check_generation(generation)?;
        self.persist(&data).await?;

        tracing::debug!(code = %data.access_code(), "exchanged link keys");
        Ok(data)
    }

    /// Collect the account key once the primary authorized this device, then
    /// register under `device_name`
    ///
    /// `AuthorizationPending` keeps the session; call again later. On success
    /// the session is cleared and the stored account is returned. Calling
    /// again after a failed save reuses the registration `data` already holds.
    pub async fn finish(
        &self,
        data: &mut ActivationData,
        device_name: &str,
    ) -> Result<Account, ActivationError> {
        data.expect_role(Role::Secondary)?;
        let channel_key = data
            .shared_key()
            .ok_or(ActivationError::MissingSharedKey)?;

        let generation = self.generation();
        let auth = match transport::fetch(self.relay.as_ref(), data.access_code(), channel_key).await
        {
            Ok(auth) => auth,
            Err(TransportError::NotYetAvailable) => {
                data.mark_awaiting_authorization();
                tracing::debug!(code = %data.access_code(), "authorization pending");
                return Err(ActivationError::AuthorizationPending);
            }
            Err(err) => return Err(err.into()),
        };
        let master_key = auth.master_key()?;

        self.ensure_current(data, generation).await?;

        // a retry after a failed save or cleanup must not register twice
        let account = match account::load_account(self.store.as_ref()).await? {
            Some((saved, _)) if saved.id == auth.account_id => saved,
            _ => {
                let reusable = data
                    .registered()
                    .filter(|registered| registered.id == auth.account_id)
                    .cloned();
                let account = match reusable {
                    Some(registered) => registered,
                    None => {
                        let account = self
                            .relay
                            .register_device(device_name.trim(), Some(&auth.account_id))
                            .await?;
                        data.set_registered(account.clone());
                        account
                    }
                };
                account::save_account(self.store.as_ref(), &account, &master_key).await?;
                account
            }
        };
        self.store.remove_prefix(ACTIVATION_PREFIX).await?;

        tracing::info!(account_id = %account.id, "device joined account");
        Ok(account)
    }
}
