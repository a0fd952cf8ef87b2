//! Registration, login and JWT issuance

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{LoginRequest, LoginResponse, RegisterRequest, Role, User, UserClaims},
    repository::users::UsersRepository,
};

const INVALID_CREDENTIALS: &str = "Invalid username or password";

/// Hash a password using Argon2
fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn issue_token(config: &AuthConfig, user: &User) -> AppResult<LoginResponse> {
    let now = Utc::now().timestamp();
    let claims = UserClaims {
        sub: user.username.clone(),
        user_id: user.id,
        role: user.role,
        exp: now + (config.jwt_expiration_hours as i64 * 3600),
        iat: now,
    };

    let token = claims
        .create_token(&config.jwt_secret)
        .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))?;

    Ok(LoginResponse {
        token,
        token_type: "Bearer".to_string(),
        user_id: user.id,
        role: user.role,
    })
}

#[derive(Clone)]
pub struct UsersService {
    repository: UsersRepository,
    config: AuthConfig,
}

impl UsersService {
    pub fn new(repository: UsersRepository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Create an account. `admin` is only granted when self-registration of
    /// administrators is enabled.
    pub async fn register(&self, request: RegisterRequest) -> AppResult<User> {
        let request = request.normalized();
        request.validate()?;

        let role = request.role.unwrap_or_default();
        if role == Role::Admin && !self.config.allow_admin_registration {
            return Err(AppError::Authorization(
                "Administrator registration is disabled".to_string(),
            ));
        }

        let password_hash = hash_password(&request.password)?;
        let user = self
            .repository
            .create(&request.username, &password_hash, role)
            .await?;

        tracing::info!("Registered user '{}' with role {}", user.username, user.role);
        Ok(user)
    }

    /// Authenticate by username and return a JWT
    pub async fn login(&self, request: LoginRequest) -> AppResult<LoginResponse> {
        request.validate()?;

        let user = self
            .repository
            .get_by_username(request.username.trim())
            .await?
            .ok_or_else(|| AppError::Authentication(INVALID_CREDENTIALS.to_string()))?;

        if !verify_password(&user.password_hash, &request.password)? {
            return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
        }

        tracing::info!("User '{}' logged in", user.username);
        issue_token(&self.config, &user)
    }

    pub async fn me(&self, claims: &UserClaims) -> AppResult<User> {
        self.repository.get_by_id(claims.user_id).await
    }
}
