//! Authenticate handler
//!
//! Binds a connection to the durable identity named by its credential. When
//! another connection already holds that identity, the newcomer wins: the
//! incumbent is moved to a fresh temporary identity, loses its credentials and
//! is told which device took over.

use super::{HandlerError, HandlerResult};
use crate::connection::Connection;
use crate::registry::SessionRegistry;
use chrono::Utc;
use im_common::{AuthConfig, CredentialCodec};
use im_core::{
    ClientAuthCredentials, EncryptedCredential, Envelope, GatewayError, Identity, KickOutNotify,
};
use std::sync::Arc;
use std::time::Duration;

/// Shortest credential string worth decrypting
const MIN_CREDENTIAL_LEN: usize = 5;

/// Verifies credentials and performs identity takeover
#[derive(Debug)]
pub struct Authenticator {
    codec: CredentialCodec,
    ttl: Duration,
}

impl Authenticator {
    pub fn new(codec: CredentialCodec, ttl: Duration) -> Self {
        Self { codec, ttl }
    }

    /// Build from configuration; `None` without a secret key
    pub fn from_config(config: &AuthConfig) -> Option<Self> {
        config
            .secret_key
            .as_deref()
            .map(|secret| Self::new(CredentialCodec::new(secret), config.credential_ttl()))
    }

    /// Codec used to decrypt credentials
    pub fn codec(&self) -> &CredentialCodec {
        &self.codec
    }

    /// Decrypt a credential and check its freshness at `now_ms`
    pub fn decode(
        &self,
        credential: &EncryptedCredential,
        now_ms: i64,
    ) -> HandlerResult<ClientAuthCredentials> {
        if credential.credential.len() < MIN_CREDENTIAL_LEN {
            return Err(HandlerError::InvalidCredential);
        }

        let credentials = self
            .codec
            .decrypt(&credential.credential)
            .map_err(|_| HandlerError::InvalidCredential)?;

        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        if credentials.age_ms(now_ms) > ttl_ms {
            return Err(HandlerError::CredentialExpired);
        }

        Ok(credentials)
    }

    /// Run one authentication exchange for `connection`
    ///
    /// On success the connection carries the credentials, is registered under
    /// its durable identity and has been sent `notify.success` for `seq`.
    pub fn authenticate(
        &self,
        registry: &SessionRegistry,
        connection: &Arc<Connection>,
        seq: i64,
        credential: &EncryptedCredential,
    ) -> HandlerResult<Identity> {
        let credentials = self.decode(credential, Utc::now().timestamp_millis())?;
        let current = connection.id();
        let durable = credentials.identity(registry.gateway_id());
        let claimant = KickOutNotify {
            device_id: credentials.device_id.clone(),
            device_name: credentials.device_name.clone(),
        };

        // Credentials are attached under the registry lock, so a concurrent
        // takeover sees them and clears them.
        let mut pending = Some(credentials);
        let mut attach = |conn: &Arc<Connection>| {
            if let Some(credentials) = pending.take() {
                conn.set_credentials(credentials);
            }
        };

        match registry.rebind(&current, &durable, &mut attach) {
            Ok(()) => {}
            Err(GatewayError::IdentityAlreadyExists(_)) => {
                Self::kick_out(registry, &durable, claimant);
                registry.rebind(&current, &durable, &mut attach)?;
            }
            Err(e) => return Err(e.into()),
        }

        // Straight to this connection: it may already have been renamed again.
        connection.enqueue_message(Envelope::notify_success(seq))?;

        tracing::info!(id = %durable, previous = %current, "Client authenticated");
        Ok(durable)
    }

    /// Move the incumbent of `durable` aside and tell it who replaced it
    fn kick_out(registry: &SessionRegistry, durable: &Identity, claimant: KickOutNotify) {
        let temp = Identity::generate_temp(registry.gateway_id());

        let mut incumbent = None;
        let moved = registry.rebind(durable, &temp, |conn| {
            conn.clear_credentials();
            incumbent = Some(Arc::clone(conn));
        });

        // The incumbent may have left in the meantime; the retry settles it.
        let (Ok(()), Some(incumbent)) = (moved, incumbent) else {
            return;
        };

        if let Err(e) = incumbent.enqueue_message(Envelope::kickout(&claimant)) {
            tracing::debug!(id = %temp, error = %e, "Kick-out notice not delivered");
        }

        tracing::info!(id = %durable, moved_to = %temp, "Session taken over by another device");
    }
}

/// Handles `authenticate` frames
pub struct AuthenticateHandler;

impl AuthenticateHandler {
    pub fn handle(
        registry: &SessionRegistry,
        connection: &Arc<Connection>,
        seq: i64,
        credential: EncryptedCredential,
    ) -> HandlerResult<()> {
        let authenticator = registry
            .authenticator()
            .ok_or(HandlerError::AuthenticationUnavailable)?;

        authenticator
            .authenticate(registry, connection, seq, &credential)
            .map(|_| ())
    }
}
