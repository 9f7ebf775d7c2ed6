use std::collections::BTreeMap;

use crate::account::Account;
use crate::crypto::{
    link_code, short_code, AgreementPrivateKey, AgreementPublicKey, Jwk, KeyCodecError,
    SymmetricKey,
};
use crate::settings::SettingsStore;

use super::code::normalize_code;
use super::{ActivationError, ActivationStep, PairingState, Role};

pub(crate) const ROLE: &str = "activationRole";
pub(crate) const STEP: &str = "activationStep";
pub(crate) const ACCESS_CODE: &str = "activationAccessCode";
pub(crate) const PRIVATE_KEY: &str = "activationPrivateKey";
pub(crate) const PUBLIC_KEY: &str = "activationPublicKey";
pub(crate) const SHARED_KEY: &str = "activationSharedKey";
pub(crate) const FIRST_HASH: &str = "activationFirstHash";
pub(crate) const SECOND_HASH: &str = "activationSecondHash";

const ALL_KEYS: [&str; 8] = [
    ROLE,
    STEP,
    ACCESS_CODE,
    PRIVATE_KEY,
    PUBLIC_KEY,
    SHARED_KEY,
    FIRST_HASH,
    SECOND_HASH,
];

/// State of one pairing session
///
/// `first_hash` is always the primary's payload and `second_hash` the
/// secondary's, whichever device holds the data, which is what makes both
/// devices display the same link code.
#[derive(Debug, Clone)]
pub struct ActivationData {
    role: Role,
    step: ActivationStep,
    access_code: String,
    private_key: AgreementPrivateKey,
    public_key: Option<AgreementPublicKey>,
    shared_key: Option<SymmetricKey>,
    first_hash: Option<String>,
    second_hash: Option<String>,
    awaiting_authorization: bool,
    /// Registration made by a `finish` whose save failed; never persisted
    registered: Option<Account>,
}

impl ActivationData {
    /// A primary session that has published its payload
    pub(crate) fn primary(
        access_code: String,
        private_key: AgreementPrivateKey,
        first_hash: String,
    ) -> Self {
        Self {
            role: Role::Primary,
            step: ActivationStep::AccessCode,
            access_code,
            private_key,
            public_key: None,
            shared_key: None,
            first_hash: Some(first_hash),
            second_hash: None,
            awaiting_authorization: false,
            registered: None,
        }
    }

    /// A secondary session right after its exchange with the relay
    pub(crate) fn secondary(
        access_code: String,
        private_key: AgreementPrivateKey,
        peer: AgreementPublicKey,
        shared_key: SymmetricKey,
        first_hash: String,
        second_hash: String,
    ) -> Self {
        Self {
            role: Role::Secondary,
            step: ActivationStep::LinkCode,
            access_code,
            private_key,
            public_key: Some(peer),
            shared_key: Some(shared_key),
            first_hash: Some(first_hash),
            second_hash: Some(second_hash),
            awaiting_authorization: false,
            registered: None,
        }
    }

    /// Record the peer's key on a primary session
    pub(crate) fn linked(
        &self,
        peer: AgreementPublicKey,
        shared_key: SymmetricKey,
        second_hash: String,
    ) -> Self {
        Self {
            step: ActivationStep::LinkCode,
            public_key: Some(peer),
            shared_key: Some(shared_key),
            second_hash: Some(second_hash),
            ..self.clone()
        }
    }

    pub(crate) fn mark_awaiting_authorization(&mut self) {
        self.awaiting_authorization = true;
    }

    pub(crate) fn registered(&self) -> Option<&Account> {
        self.registered.as_ref()
    }

    pub(crate) fn set_registered(&mut self, account: Account) {
        self.registered = Some(account);
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn step(&self) -> ActivationStep {
        self.step
    }

    pub fn access_code(&self) -> &str {
        &self.access_code
    }

    pub fn private_key(&self) -> &AgreementPrivateKey {
        &self.private_key
    }

    pub fn shared_key(&self) -> Option<&SymmetricKey> {
        self.shared_key.as_ref()
    }

    pub fn first_hash(&self) -> Option<&str> {
        self.first_hash.as_deref()
    }

    pub fn second_hash(&self) -> Option<&str> {
        self.second_hash.as_deref()
    }

    /// The first half of the link code, available as soon as the primary
    ///  published its payload
    pub fn partial_link_code(&self) -> Option<String> {
        self.first_hash().map(short_code)
    }

    /// The full link code once both payloads are known
    pub fn link_code(&self) -> Option<String> {
        match (self.first_hash(), self.second_hash()) {
            (Some(first), Some(second)) => Some(link_code(first, second)),
            _ => None,
        }
    }

    /// Compare a user-entered code against the full link code
    pub fn link_code_matches(&self, entered: &str) -> Result<bool, ActivationError> {
        let entered = normalize_code(entered);
        if entered.is_empty() {
            return Err(ActivationError::EmptyLinkCode);
        }
        let expected = self.link_code().ok_or(ActivationError::MissingPeerHash)?;
        Ok(normalize_code(&expected) == entered)
    }

    pub fn state(&self) -> PairingState {
        match (self.role, self.step) {
            (Role::Primary, ActivationStep::AccessCode) => PairingState::AccessCodeIssued,
            (Role::Primary, ActivationStep::LinkCode) => PairingState::LinkCodeReady,
            (Role::Secondary, ActivationStep::AccessCode) => PairingState::AccessCodeEntered,
            (Role::Secondary, ActivationStep::LinkCode) if self.awaiting_authorization => {
                PairingState::AwaitingAuthorization
            }
            (Role::Secondary, ActivationStep::LinkCode) => PairingState::LinkCodeDisplayed,
        }
    }

    pub(crate) fn expect_role(&self, expected: Role) -> Result<(), ActivationError> {
        if self.role != expected {
            return Err(ActivationError::WrongRole {
                expected,
                actual: self.role,
            });
        }
        Ok(())
    }

    /// The flat settings entries for this session, written in one `set`
    pub(crate) fn to_settings(&self) -> Result<BTreeMap<String, String>, KeyCodecError> {
        let mut values = BTreeMap::new();
        values.insert(ROLE.to_string(), self.role.as_str().to_string());
        values.insert(STEP.to_string(), self.step.as_str().to_string());
        values.insert(ACCESS_CODE.to_string(), self.access_code.clone());
        values.insert(
            PRIVATE_KEY.to_string(),
            self.private_key.to_jwk().to_json_string()?,
        );
        if let Some(public_key) = &self.public_key {
            values.insert(PUBLIC_KEY.to_string(), public_key.to_jwk().to_json_string()?);
        }
        if let Some(shared_key) = &self.shared_key {
            values.insert(SHARED_KEY.to_string(), shared_key.to_jwk().to_json_string()?);
        }
        if let Some(first_hash) = &self.first_hash {
            values.insert(FIRST_HASH.to_string(), first_hash.clone());
        }
        if let Some(second_hash) = &self.second_hash {
            values.insert(SECOND_HASH.to_string(), second_hash.clone());
        }
        Ok(values)
    }

    /// Rebuild a session from settings
    ///
    /// Returns `None` unless both the access code and the private key are
    /// stored. A session written before roles were recorded is a primary one.
    pub(crate) fn from_settings(
        values: &BTreeMap<String, String>,
    ) -> Result<Option<Self>, ActivationError> {
        let (Some(access_code), Some(private_key)) = (values.get(ACCESS_CODE), values.get(PRIVATE_KEY))
        else {
            return Ok(None);
        };

        let role = match values.get(ROLE) {
            Some(role) => Role::parse(role).ok_or_else(|| corrupt(ROLE))?,
            None => Role::Primary,
        };
        let step = values
            .get(STEP)
            .and_then(|step| ActivationStep::parse(step))
            .ok_or_else(|| corrupt(STEP))?;

        let private_key = import(private_key, PRIVATE_KEY, AgreementPrivateKey::from_jwk)?;
        let public_key = values
            .get(PUBLIC_KEY)
            .map(|value| import(value, PUBLIC_KEY, AgreementPublicKey::from_jwk))
            .transpose()?;
        let shared_key = values
            .get(SHARED_KEY)
            .map(|value| import(value, SHARED_KEY, SymmetricKey::from_jwk))
            .transpose()?;

        if public_key.is_some() != shared_key.is_some() {
            return Err(corrupt(SHARED_KEY));
        }
        if step == ActivationStep::LinkCode && shared_key.is_none() {
            return Err(corrupt(SHARED_KEY));
        }

        Ok(Some(Self {
            role,
            step,
            access_code: access_code.clone(),
            private_key,
            public_key,
            shared_key,
            first_hash: values.get(FIRST_HASH).cloned(),
            second_hash: values.get(SECOND_HASH).cloned(),
            awaiting_authorization: false,
            registered: None,
        }))
    }

    pub(crate) async fn load(
        store: &dyn SettingsStore,
    ) -> Result<Option<Self>, ActivationError> {
        let values = store.get(&ALL_KEYS).await?;
        Self::from_settings(&values)
    }
}

fn corrupt(field: &str) -> ActivationError {
    ActivationError::Corrupt(field.to_string())
}

fn import<T>(
    value: &str,
    field: &str,
    from_jwk: impl Fn(&Jwk) -> Result<T, KeyCodecError>,
) -> Result<T, ActivationError> {
    let jwk: Jwk = value.parse().map_err(|_| corrupt(field))?;
    from_jwk(&jwk).map_err(|_| corrupt(field))
}
