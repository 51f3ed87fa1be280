//! Trusted identity providers and their accepted audiences.

use std::sync::Arc;

use crate::error::{AuthError, Result};

type AudiencePredicate = dyn Fn(&str) -> bool + Send + Sync;

/// Predicate deciding whether a token audience is accepted for a provider.
#[derive(Clone)]
pub struct AudienceCondition(Arc<AudiencePredicate>);

impl AudienceCondition {
    /// Accepts exactly the given client identifiers.
    #[must_use]
    pub fn list<I, S>(client_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client_ids: Vec<String> = client_ids.into_iter().map(Into::into).collect();
        Self(Arc::new(move |audience: &str| client_ids.iter().any(|id| id == audience)))
    }

    /// Accepts every audience.
    #[must_use]
    pub fn any() -> Self {
        Self(Arc::new(|_: &str| true))
    }

    /// Accepts audiences for which `predicate` returns `true`.
    #[must_use]
    pub fn custom(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    /// Returns `true` if `audience` is accepted.
    #[must_use]
    pub fn accepts(&self, audience: &str) -> bool {
        (self.0)(audience)
    }
}

impl std::fmt::Debug for AudienceCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AudienceCondition(..)")
    }
}

/// An identity provider trusted to issue tokens.
#[derive(Clone, Debug)]
pub struct Provider {
    issuer: String,
    audience: AudienceCondition,
}

impl Provider {
    /// Creates a provider after validating its issuer.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidIssuer`] if `issuer` is empty.
    pub fn new(issuer: impl Into<String>, audience: AudienceCondition) -> Result<Self> {
        let provider = Self { issuer: issuer.into(), audience };
        provider.validate()?;
        Ok(provider)
    }

    /// Returns the issuer identifier matched against the `iss` claim.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns `true` if `audience` is accepted by this provider.
    #[must_use]
    pub fn accepts_audience(&self, audience: &str) -> bool {
        self.audience.accepts(audience)
    }

    fn validate(&self) -> Result<()> {
        if self.issuer.is_empty() {
            return Err(AuthError::invalid_issuer("Empty string issuer not allowed"));
        }
        Ok(())
    }
}

/// Ordered collection of trusted providers.
#[derive(Clone, Debug, Default)]
pub struct ProviderRegistry {
    providers: Arc<[Provider]>,
}

impl ProviderRegistry {
    /// Creates a registry from `providers`. Validation is deferred to
    /// [`validate`](Self::validate).
    #[must_use]
    pub fn new(providers: Vec<Provider>) -> Self {
        Self { providers: providers.into() }
    }

    /// Checks that the registry can be used for validation.
    ///
    /// # Errors
    ///
    /// - [`AuthError::EmptyProviderCollection`] if no providers are registered
    /// - [`AuthError::InvalidIssuer`] if a member has an invalid issuer
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(AuthError::EmptyProviderCollection);
        }
        self.providers.iter().try_for_each(Provider::validate)
    }

    /// Returns the provider whose issuer equals `issuer`.
    #[must_use]
    pub fn find(&self, issuer: &str) -> Option<&Provider> {
        self.providers.iter().find(|provider| provider.issuer == issuer)
    }

    /// Returns the registered providers in order.
    #[must_use]
    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    /// Returns the number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if no providers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl FromIterator<Provider> for ProviderRegistry {
    fn from_iter<T: IntoIterator<Item = Provider>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Supplies the provider registry consulted by each validation.
///
/// The registry is fetched anew for every token, so implementations may
/// change the trusted set at runtime.
pub trait ProviderSource: Send + Sync {
    /// Returns the current registry.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ProviderSourceFailed`] if the registry cannot be
    /// produced.
    fn providers(&self) -> Result<ProviderRegistry>;
}

impl ProviderSource for ProviderRegistry {
    fn providers(&self) -> Result<ProviderRegistry> {
        Ok(self.clone())
    }
}

/// [`ProviderSource`] that evaluates a closure for every validation.
pub struct DynamicProviders<F> {
    source: F,
}

impl<F, E> DynamicProviders<F>
where
    F: Fn() -> std::result::Result<Vec<Provider>, E> + Send + Sync,
    E: std::error::Error + Send + Sync + 'static,
{
    /// Wraps `source`.
    #[must_use]
    pub fn new(source: F) -> Self {
        Self { source }
    }
}

impl<F, E> ProviderSource for DynamicProviders<F>
where
    F: Fn() -> std::result::Result<Vec<Provider>, E> + Send + Sync,
    E: std::error::Error + Send + Sync + 'static,
{
    fn providers(&self) -> Result<ProviderRegistry> {
        (self.source)().map(ProviderRegistry::new).map_err(AuthError::provider_source_failed)
    }
}

impl<F> std::fmt::Debug for DynamicProviders<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicProviders").finish_non_exhaustive()
    }
}
