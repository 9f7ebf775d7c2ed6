use std::time::Duration;

use crate::crypto::{derive_shared_key, AgreementPublicKey, KeyPair};
use crate::relay::RelayError;
use crate::transport::{self, AccountAuth, TransportError};

use super::{Activator, ActivationData, ActivationError, ActivationStep, LinkStatus, Role};

impl Activator {
    /// Start (or resume) adding a device to this account
    ///
    /// Publishes a fresh ephemeral public key and returns the session holding
    /// the access code to show the user.
    pub async fn issue_access_code(&self) -> Result<ActivationData, ActivationError> {
        if let Some(existing) = self.resume().await? {
            existing.expect_role(Role::Primary).map_err(|_| {
                ActivationError::SessionInProgress(existing.role())
            })?;
            tracing::debug!(code = %existing.access_code(), "resuming primary pairing session");
            return Ok(existing);
        }

        let generation = self.generation();
        let pair = KeyPair::generate();
        let payload = self.key_payload(&pair.public);
        let first_hash = payload.hash();

        let code = self.relay.request_access_code(&payload).await?;
        self.check_generation(generation)?;

        let data = ActivationData::primary(code, pair.private, first_hash);
        self.persist(&data).await?;

        tracing::debug!(code = %data.access_code(), "issued access code");
        Ok(data)
    }

    /// Try once to pick up the secondary's public key
    ///
    /// `Pending` means the secondary has not exchanged yet; `data` is left
    /// exactly as it was. On success the shared key is derived and the
    /// session moves to the link-code step.
    pub async fn link_peer(&self, data: &mut ActivationData) -> Result<LinkStatus, ActivationError> {
        data.expect_role(Role::Primary)?;
        if data.step() == ActivationStep::LinkCode {
            return Ok(LinkStatus::Linked);
        }

        let generation = self.generation();
        let peer_payload = match self.relay.fetch_link_key(data.access_code()).await {
            Ok(payload) => payload,
            Err(RelayError::NotFound) => return Ok(LinkStatus::Pending),
            Err(err) => return Err(err.into()),
        };

        let peer = AgreementPublicKey::from_jwk(&peer_payload.key)?;
        let shared_key = derive_shared_key(data.private_key(), &peer)?;
        let linked = data.linked(peer, shared_key, peer_payload.hash());

        self.persist_current(&linked, generation).await?;
        *data = linked;

        tracing::debug!(code = %data.access_code(), "peer linked");
        Ok(LinkStatus::Linked)
    }

    /// Poll `link_peer` until the peer shows up or `attempts` run out
    pub async fn wait_for_peer(
        &self,
        data: &mut ActivationData,
        interval: Duration,
        attempts: u32,
    ) -> Result<LinkStatus, ActivationError> {
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(interval).await;
            }
            if self.link_peer(data).await? == LinkStatus::Linked {
                return Ok(LinkStatus::Linked);
            }
        }
        Ok(LinkStatus::Pending)
    }

    /// Check the link code the user typed and, if it matches, hand the
    /// account key to the secondary
    ///
    /// A mismatch leaves the session open so the user can try again.
    pub async fn authorize_peer(
        &self,
        data: &mut ActivationData,
        entered: &str,
        auth: &AccountAuth,
    ) -> Result<(), ActivationError> {
        data.expect_role(Role::Primary)?;

        if data.second_hash().is_none() && self.link_peer(data).await? == LinkStatus::Pending {
            return Err(ActivationError::PeerNotLinked);
        }

        if !data.link_code_matches(entered)? {
            tracing::warn!(code = %data.access_code(), "link code mismatch");
            return Err(ActivationError::LinkCodeMismatch);
        }

        let channel_key = data
            .shared_key()
            .ok_or(ActivationError::MissingSharedKey)?;
        match transport::publish(self.relay.as_ref(), data.access_code(), auth, channel_key).await {
            Ok(()) => {}
            // the relay dropped the session under us
            Err(TransportError::NotYetAvailable) => return Err(ActivationError::UnknownAccessCode),
            Err(err) => return Err(err.into()),
        }

        tracing::debug!(code = %data.access_code(), "peer authorized");
        Ok(())
    }
}
