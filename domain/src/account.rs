//! Registration, login and marketplace credential management.

use std::sync::Arc;

use tracing::{info, warn};

use crate::validate::validate_password;
use crate::{
    Clock, CoreError, CredentialInput, Email, Marketplace, MarketplaceCredential, NewUser,
    Resource, SessionAuthority, Store, User, UserId,
};

/// A signed-in user together with the bearer token issued for them.
#[derive(Clone, Debug)]
pub struct Session {
    pub user: User,
    pub token: String,
}

pub struct AccountService<C: Clock> {
    store: Arc<dyn Store>,
    auth: Arc<dyn SessionAuthority>,
    clock: C,
}

impl<C: Clock> AccountService<C> {
    pub fn new(store: Arc<dyn Store>, auth: Arc<dyn SessionAuthority>, clock: C) -> Self {
        Self { store, auth, clock }
    }

    pub fn register(&self, email: &str, password: &str) -> Result<Session, CoreError> {
        let email = Email::new(email)?;
        validate_password(password)?;
        if self.store.get_user_by_email(&email)?.is_some() {
            return Err(CoreError::AlreadyExists(Resource::User));
        }
        let user = self.store.create_user(NewUser {
            email,
            password_hash: self.auth.hash_password(password)?,
            created_at: self.clock.now(),
        })?;
        info!(user_id = user.id, "user registered");
        let token = self.auth.issue_token(user.id)?;
        Ok(Session { user, token })
    }

    /// Unknown emails answer `NotFound(User)`; wrong passwords `Unauthorized`.
    pub fn login(&self, email: &str, password: &str) -> Result<Session, CoreError> {
        let email = Email::new(email)?;
        let user = self
            .store
            .get_user_by_email(&email)?
            .ok_or(CoreError::NotFound(Resource::User))?;
        if !self.auth.verify_password(password, &user.password_hash)? {
            warn!(user_id = user.id, "login rejected");
            return Err(CoreError::Unauthorized);
        }
        let token = self.auth.issue_token(user.id)?;
        Ok(Session { user, token })
    }

    /// Resolve a bearer token to the caller's id.
    pub fn authenticate(&self, token: &str) -> Result<UserId, CoreError> {
        self.auth.verify_token(token)
    }

    pub fn me(&self, user_id: UserId) -> Result<User, CoreError> {
        self.store
            .get_user(user_id)?
            .ok_or(CoreError::NotFound(Resource::User))
    }

    pub fn save_credential(
        &self,
        user_id: UserId,
        marketplace: Marketplace,
        input: &CredentialInput,
    ) -> Result<MarketplaceCredential, CoreError> {
        let required: &[(&str, &str)] = match marketplace {
            Marketplace::Lazada => &[
                ("app_key", input.app_key.as_str()),
                ("app_secret", input.app_secret.as_str()),
            ],
            Marketplace::Shopee => &[
                ("app_id", input.app_id.as_str()),
                ("app_secret", input.app_secret.as_str()),
            ],
        };
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(CoreError::InvalidInput(format!(
                "{field} is required for {marketplace}"
            )));
        }
        let cred = self
            .store
            .upsert_credential(user_id, marketplace, input, self.clock.now())?;
        info!(user_id, %marketplace, "marketplace credential saved");
        Ok(cred)
    }

    /// Succeeds when the caller has credentials for `marketplace`.
    pub fn check_credential(&self, user_id: UserId, marketplace: Marketplace) -> Result<(), CoreError> {
        match self.store.get_credential(user_id, marketplace)? {
            Some(_) => Ok(()),
            None => Err(CoreError::NotFound(Resource::Credential)),
        }
    }

    pub fn delete_credential(&self, user_id: UserId, marketplace: Marketplace) -> Result<(), CoreError> {
        if !self.store.delete_credential(user_id, marketplace)? {
            return Err(CoreError::NotFound(Resource::Credential));
        }
        info!(user_id, %marketplace, "marketplace credential deleted");
        Ok(())
    }
}
