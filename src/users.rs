// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! First-run user setup of a fresh instance.
//!
//! A new installation ships with well-known sysadmin and tenant credentials.
//! [`UserConfigurator`] replaces them and creates the application user the
//! rest of the system logs in with.

use uuid::Uuid;

use crate::config::{
    TB_SYSADMIN_PW, TB_SYSADMIN_USER, TB_TENANT_PW, TB_TENANT_USER, TbConfig, mask_password,
};
use crate::entity::{EntityType, TbEntity, Tenant, User};
use crate::error::{EntityError, Error, ProtocolError, Result};
use crate::rest::RestClient;

/// Configures the default and application users of an instance.
#[derive(Clone)]
pub struct UserConfigurator {
    config: TbConfig,
    sysadmin_password: String,
}

impl UserConfigurator {
    /// Creates a configurator for the instance of `config`.
    ///
    /// Credentials of `config` are not used; the sysadmin password starts as
    /// the factory default.
    #[must_use]
    pub fn new(config: TbConfig) -> Self {
        Self {
            config,
            sysadmin_password: TB_SYSADMIN_PW.to_string(),
        }
    }

    /// Uses `password` as the current sysadmin password.
    #[must_use]
    pub fn with_sysadmin_password(mut self, password: impl Into<String>) -> Self {
        self.sysadmin_password = password.into();
        self
    }

    /// Returns the sysadmin password used for further operations.
    #[must_use]
    pub fn sysadmin_password(&self) -> &str {
        &self.sysadmin_password
    }

    /// Changes the sysadmin and the default tenant user passwords.
    ///
    /// # Errors
    ///
    /// Returns transport errors. Rejected credentials are logged and skipped.
    pub async fn update_default_user_passwords(
        &mut self,
        new_sysadmin_password: &str,
        new_user_password: &str,
    ) -> Result<()> {
        self.update_default_sysadmin_password(new_sysadmin_password)
            .await?;
        self.update_default_tenant_user_password(new_user_password)
            .await
    }

    /// Changes the sysadmin password and remembers it.
    ///
    /// # Errors
    ///
    /// Returns transport errors. Rejected credentials are logged and skipped.
    pub async fn update_default_sysadmin_password(&mut self, new_password: &str) -> Result<()> {
        let current = self.sysadmin_password.clone();
        match self
            .update_password(TB_SYSADMIN_USER, &current, new_password)
            .await
        {
            Ok(()) => {
                self.sysadmin_password = new_password.to_string();
                Ok(())
            }
            Err(e) if is_rejection(&e) => {
                tracing::info!(error = %e, "Sysadmin password change failed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Changes the default tenant user password. Skipped when the password
    /// is no longer the default one.
    ///
    /// # Errors
    ///
    /// Returns transport errors.
    pub async fn update_default_tenant_user_password(&self, new_password: &str) -> Result<()> {
        match self
            .update_password(TB_TENANT_USER, TB_TENANT_PW, new_password)
            .await
        {
            Ok(()) => {
                tracing::info!("Adjusted tenant user password");
                Ok(())
            }
            Err(e) if is_rejection(&e) => {
                tracing::info!("Skipping password change of tenant user");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Changes the password of `username`.
    ///
    /// Nothing happens if the password already is `new_password`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::AuthenticationFailed`] if neither password is
    /// accepted.
    pub async fn update_password(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let changed = async {
            let client = self.login(username, old_password).await?;
            client.change_password(old_password, new_password).await
        }
        .await;

        match changed {
            Ok(()) => {
                tracing::info!(user = %username, "Adjusted password");
                Ok(())
            }
            Err(e) if is_rejection(&e) => {
                self.login(username, new_password).await?;
                tracing::info!(user = %username, "Password already set, nothing changed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Creates a tenant administrator and its tenant, unless the user can
    /// already log in.
    ///
    /// The local part of the email becomes the first name and the domain
    /// the last name. An existing tenant with the same title is reused.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::AuthenticationFailed`] if the sysadmin
    /// cannot log in, or any error of the creation requests.
    pub async fn create_new_application_user(
        &self,
        email: &str,
        password: &str,
        tenant_title: &str,
    ) -> Result<User> {
        if let Ok(client) = self.login(email, password).await {
            tracing::info!(user = %email, "Application user already present, skipping");
            if let Some(user) = client
                .get_users()
                .await?
                .into_iter()
                .rfind(|u| u.email == email)
            {
                return Ok(user);
            }
            return Ok(User {
                email: email.to_string(),
                ..User::default()
            });
        }

        let sysadmin = self
            .login(TB_SYSADMIN_USER, &self.sysadmin_password)
            .await?;
        let tenant = find_or_create_tenant(&sysadmin, tenant_title).await?;
        let tenant_id = tenant.id.ok_or(EntityError::MissingId(EntityType::Tenant))?;

        tracing::info!(user = %email, tenant = %tenant_title, "Creating application user");
        let user = sysadmin
            .save_entity(&User::tenant_admin(email, tenant_id))
            .await?;
        let user_id: Uuid = user.uuid().ok_or(EntityError::MissingId(EntityType::User))?;

        let link = sysadmin.get_activation_link(user_id).await?;
        sysadmin.activate_user_from_link(&link, password).await?;
        Ok(user)
    }

    async fn login(&self, username: &str, password: &str) -> Result<RestClient> {
        let client = RestClient::new(&self.config)?;
        client.login(username, password).await?;
        Ok(client)
    }
}

impl std::fmt::Debug for UserConfigurator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserConfigurator")
            .field("config", &self.config)
            .field("sysadmin_password", &mask_password(&self.sysadmin_password))
            .finish()
    }
}

async fn find_or_create_tenant(sysadmin: &RestClient, title: &str) -> Result<Tenant> {
    if let Some(tenant) = sysadmin
        .get_tenants()
        .await?
        .into_iter()
        .rfind(|t| t.title == title)
    {
        tracing::debug!(tenant = %title, "Reusing existing tenant");
        return Ok(tenant);
    }

    tracing::info!(tenant = %title, "Creating tenant");
    sysadmin
        .save_entity(&Tenant {
            title: title.to_string(),
            ..Tenant::default()
        })
        .await
}

fn is_rejection(err: &Error) -> bool {
    err.is_client_error() || matches!(err, Error::Protocol(ProtocolError::AuthenticationFailed(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_detection() {
        let auth: Error = ProtocolError::AuthenticationFailed("u".into()).into();
        assert!(is_rejection(&auth));

        let bad_request: Error = ProtocolError::Status {
            status: 400,
            body: String::new(),
        }
        .into();
        assert!(is_rejection(&bad_request));

        let server: Error = ProtocolError::Status {
            status: 503,
            body: String::new(),
        }
        .into();
        assert!(!is_rejection(&server));
    }

    #[test]
    fn sysadmin_password_defaults() {
        let configurator = UserConfigurator::new(TbConfig::new("localhost"));
        assert_eq!(configurator.sysadmin_password(), TB_SYSADMIN_PW);

        let configurator = configurator.with_sysadmin_password("secret");
        assert_eq!(configurator.sysadmin_password(), "secret");
    }
}
