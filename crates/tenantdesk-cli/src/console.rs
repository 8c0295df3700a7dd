//! Console state and command handlers.
//!
//! `Console` wires the core together the way a web front end would: one
//! session id (kept in config), an encrypted on-disk token store, keychain
//! credentials, and a `TenantService` for the tenant operations.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::join_all;
use rand::RngCore;
use tracing::{debug, info, warn};

use tenantdesk_core::api::TenantClient;
use tenantdesk_core::auth::{
    AuthError, CredentialRef, CredentialSource, FileTokenStore, HealthState, KeyringCredentials,
    TokenClient, TokenManager, TokenStatus,
};
use tenantdesk_core::config::{Config, Settings};
use tenantdesk_core::export::{export_file_name, export_json};
use tenantdesk_core::models::{parse_admin_emails, NewTenant, Tenant, TenantFields, TenantUpdate};
use tenantdesk_core::utils::{format_duration_secs, truncate_string};
use tenantdesk_core::TenantService;

use crate::cli::FieldArgs;

/// Keychain entry holding the session store secret when SECRET_KEY is unset
const SESSION_SECRET_NAME: &str = "session-store-key";

/// Secrets shorter than this get a warning
const MIN_SECRET_LENGTH: usize = 16;

/// Column widths for the tenant table
const NAME_COLUMN_WIDTH: usize = 30;
const ADMINS_COLUMN_WIDTH: usize = 40;

pub struct Console {
    config: Config,
    settings: Settings,
    tokens: Arc<TokenManager>,
    service: TenantService,
}

impl Console {
    pub fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        let settings = Settings::from_env();
        debug!(base_url = %settings.base_url, token_url = %settings.token_url, "Settings loaded");

        let sessions_dir = config
            .sessions_dir()
            .unwrap_or_else(|_| PathBuf::from("./sessions"));
        let store = FileTokenStore::open(sessions_dir, &session_secret()?)?;

        let endpoint = TokenClient::new(&settings.token_url, settings.verify_ssl)?;
        let tokens = Arc::new(
            TokenManager::new(Arc::new(store), Arc::new(KeyringCredentials), endpoint)
                .with_policy(settings.policy),
        );
        let client = TenantClient::new(&settings.base_url, settings.verify_ssl)?;
        let service = TenantService::new(tokens.clone(), client);

        Ok(Self {
            config,
            settings,
            tokens,
            service,
        })
    }

    /// Current session id, or a fresh one if there is none yet
    fn session_id(&mut self) -> String {
        match &self.config.session_id {
            Some(id) => id.clone(),
            None => {
                let id = random_hex(16);
                self.config.session_id = Some(id.clone());
                id
            }
        }
    }

    /// Session id for commands that need an existing session
    fn current_session(&self) -> Result<&str, AuthError> {
        self.config
            .session_id
            .as_deref()
            .ok_or(AuthError::AuthRequired)
    }

    async fn current_status(&self) -> TokenStatus {
        match self.current_session() {
            Ok(session_id) => self.tokens.status(session_id).await,
            Err(_) => TokenStatus::absent(),
        }
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub async fn login(&mut self, username: Option<String>) -> Result<()> {
        let username = match username.or_else(|| self.config.last_username.clone()) {
            Some(u) if !u.trim().is_empty() => u,
            _ => prompt("Username: ")?,
        };
        let password = match std::env::var("TENANTDESK_PASSWORD") {
            Ok(p) if !p.is_empty() => p,
            _ => rpassword::prompt_password(format!("Password for {}: ", username.trim()))?,
        };

        let session_id = self.session_id();
        let record = self
            .tokens
            .login(&session_id, &username, &password)
            .await
            .context("Login failed")?;

        self.config.last_username = Some(record.credentials_ref.username().to_string());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        info!(session_id = %session_id, "Login successful");
        println!(
            "Authenticated as {} (token expires in {})",
            record.credentials_ref.username(),
            format_duration_secs(record.expires_in)
        );
        Ok(())
    }

    pub async fn logout(&mut self) -> Result<()> {
        let username = self.current_status().await.username;
        if let Some(session_id) = self.config.session_id.take() {
            self.tokens.logout(&session_id).await?;
        }
        if let Some(ref username) = username {
            let credentials = CredentialRef::new(username.as_str());
            if KeyringCredentials::has_credentials(&credentials) {
                KeyringCredentials.delete(&credentials)?;
                debug!(username = %username, "Deleted stored credentials");
            }
        }
        self.config.save()?;
        println!(
            "Logged out successfully ({})",
            username.as_deref().unwrap_or("User")
        );
        Ok(())
    }

    pub async fn status(&self, json: bool) -> Result<()> {
        let status = self.current_status().await;
        if json {
            println!("{}", serde_json::to_string_pretty(&status)?);
        } else {
            println!("{}", describe_status(&status));
        }
        Ok(())
    }

    pub async fn refresh(&self) -> Result<()> {
        self.tokens.force_refresh(self.current_session()?).await?;
        let status = self.current_status().await;
        println!("Token refreshed. {}", describe_status(&status));
        Ok(())
    }

    // =========================================================================
    // Tenants
    // =========================================================================

    pub async fn list(&self, search: Option<&str>, json: bool) -> Result<()> {
        let session_id = self.current_session()?;
        let tenants = match search {
            Some(query) => self.service.search_tenants(session_id, query).await?,
            None => self.service.list_tenants(session_id).await?,
        };

        if json {
            println!("{}", export_json(&tenants)?);
            return Ok(());
        }

        println!(
            "{:<38} {:<width$} {:>6}  {:<24} ADMINS",
            "ID",
            "NAME",
            "SEATS",
            "LOCATION",
            width = NAME_COLUMN_WIDTH
        );
        for tenant in &tenants {
            println!("{}", table_row(tenant));
        }
        println!("\n{} tenant(s)", tenants.len());
        self.warn_if_expiring().await;
        Ok(())
    }

    pub async fn show(&self, ids: &[String]) -> Result<()> {
        let session_id = self.current_session()?;
        let lookups = ids
            .iter()
            .map(|id| self.service.get_tenant(session_id, id));
        for (id, result) in ids.iter().zip(join_all(lookups).await) {
            let tenant = result.with_context(|| format!("Failed to fetch tenant {}", id))?;
            println!("{}", serde_json::to_string_pretty(&tenant)?);
        }
        Ok(())
    }

    pub async fn create(
        &self,
        fields: FieldArgs,
        primary_admin_email: Option<String>,
        primary_admin_first_name: Option<String>,
        primary_admin_last_name: Option<String>,
    ) -> Result<()> {
        let defaults = self.settings.tenant_defaults.clone();
        let admin_details = match fields.admins.as_deref() {
            Some(admins) => parse_admin_emails(admins),
            None => defaults.admin_details,
        };
        let tenant = NewTenant {
            fields: merge_fields(fields, defaults.fields),
            primary_admin_email: primary_admin_email.or(defaults.primary_admin_email),
            primary_admin_first_name: primary_admin_first_name
                .or(defaults.primary_admin_first_name),
            primary_admin_last_name: primary_admin_last_name.or(defaults.primary_admin_last_name),
            admin_details,
        };
        if tenant.fields.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            anyhow::bail!("A tenant name is required (--name or TENANT_NAME)");
        }

        let created = self
            .service
            .create_tenant(self.current_session()?, tenant)
            .await?;
        println!(
            "Tenant created successfully! {} ({})",
            created.display_name(),
            created.display_id()
        );
        Ok(())
    }

    pub async fn update(&self, id: &str, fields: FieldArgs) -> Result<()> {
        let admin_details = fields.admins.as_deref().map(parse_admin_emails);
        let update = TenantUpdate {
            fields: merge_fields(fields, TenantFields::default()),
            admin_details,
        };

        let updated = self
            .service
            .update_tenant(self.current_session()?, id, &update)
            .await?;
        println!(
            "Tenant updated successfully! {} ({})",
            updated.display_name(),
            updated.display_id()
        );
        Ok(())
    }

    pub async fn delete(&self, ids: &[String], yes: bool) -> Result<()> {
        let session_id = self.current_session()?;
        if !yes {
            let answer = prompt(&format!("Delete {} tenant(s)? [y/N]: ", ids.len()))?;
            if !answer.eq_ignore_ascii_case("y") {
                println!("Aborted");
                return Ok(());
            }
        }

        self.service.delete_tenants(session_id, ids).await?;
        println!("Successfully deleted {} tenant(s)", ids.len());
        Ok(())
    }

    pub async fn export(&self, output: Option<PathBuf>) -> Result<()> {
        let session_id = self.current_session()?;
        let tenants = self.service.list_tenants(session_id).await?;
        let username = self.tokens.status(session_id).await.username;

        let path = output.unwrap_or_else(|| {
            PathBuf::from(export_file_name(username.as_deref(), Utc::now()))
        });
        std::fs::write(&path, export_json(&tenants)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Exported {} tenant(s) to {}", tenants.len(), path.display());
        Ok(())
    }

    async fn warn_if_expiring(&self) {
        let status = self.current_status().await;
        if status.health == HealthState::ExpiringSoon {
            eprintln!("Note: {}", describe_status(&status));
        }
    }
}

fn merge_fields(args: FieldArgs, defaults: TenantFields) -> TenantFields {
    TenantFields {
        name: args.name.or(defaults.name),
        seats: args.seats.or(defaults.seats),
        comments: args.comments.or(defaults.comments),
        city: args.city.or(defaults.city),
        state: args.state.or(defaults.state),
        zip_code: args.zip_code.or(defaults.zip_code),
        country_code: args.country_code.or(defaults.country_code),
        address_line1: args.address_line1.or(defaults.address_line1),
        address_line2: args.address_line2.or(defaults.address_line2),
    }
}

fn table_row(tenant: &Tenant) -> String {
    format!(
        "{:<38} {:<width$} {:>6}  {:<24} {}",
        tenant.display_id(),
        truncate_string(tenant.display_name(), NAME_COLUMN_WIDTH),
        tenant
            .seats
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string()),
        truncate_string(&tenant.location_display(), 24),
        truncate_string(&tenant.admin_emails_display(), ADMINS_COLUMN_WIDTH),
        width = NAME_COLUMN_WIDTH
    )
}

fn describe_status(status: &TokenStatus) -> String {
    let indicator = format!("{:?}", status.indicator).to_uppercase();
    match (status.expires_in, status.expires_at) {
        (Some(expires_in), Some(expires_at)) => format!(
            "[{}] Token {} for {} - expires in {} ({})",
            indicator,
            status.health.label(),
            status.username.as_deref().unwrap_or("unknown user"),
            format_duration_secs(expires_in),
            expires_at.to_rfc3339()
        ),
        _ => format!("[{}] Not logged in. Run `tenantdesk login`.", indicator),
    }
}

fn session_secret() -> Result<String> {
    if let Ok(secret) = std::env::var("SECRET_KEY") {
        if secret.len() < MIN_SECRET_LENGTH {
            warn!("SECRET_KEY is too short. Use at least 16 characters");
        }
        return Ok(secret);
    }
    KeyringCredentials::get_or_create_secret(SESSION_SECRET_NAME, || {
        info!("Generated a new session store key in the OS keychain");
        random_hex(32)
    })
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{:02x}", b)).collect()
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
