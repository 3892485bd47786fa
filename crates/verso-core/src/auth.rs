//! Authorization contract consumed by the catalog.
//!
//! The catalog never stores users, groups or credentials; it consults an
//! [`Authorizer`] with the subject and the permissions an operation requires.
//! This module ships the contract types, deny-precedence policy evaluation
//! with wildcard actions and `${user}` resource interpolation, a static
//! in-memory implementation, and a TTL cache wrapper.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::Result;

/// The authenticated principal an operation runs as.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subject {
    /// Display name of the user, interpolated into `${user}` resources.
    pub user: String,
}

impl Subject {
    /// Creates a subject for the given user display name.
    #[must_use]
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }
}

/// A single permission an operation requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    /// Action name, e.g. `repos:ReadObject`.
    pub action: String,
    /// Resource ARN the action targets.
    pub resource_arn: String,
}

impl Permission {
    /// Creates a permission from an action and resource ARN.
    #[must_use]
    pub fn new(action: impl Into<String>, resource_arn: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource_arn: resource_arn.into(),
        }
    }
}

/// Whether a statement allows or denies its actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementEffect {
    /// The statement grants the actions.
    Allow,
    /// The statement forbids the actions; deny takes precedence.
    Deny,
}

/// One statement of an authorization policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    /// Allow or deny.
    pub effect: StatementEffect,
    /// Action patterns; `*` and `?` wildcards are honored.
    pub actions: Vec<String>,
    /// Resource ARN pattern; supports wildcards per segment and `${user}`.
    pub resource: String,
}

/// A named authorization policy attached to users or groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthPolicy {
    /// Unique policy name.
    pub name: String,
    /// The policy's statements.
    pub statements: Vec<PolicyStatement>,
}

/// The outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthDecision {
    /// Whether every required permission was granted.
    pub allowed: bool,
    /// Why the request was denied, when it was.
    pub reason: Option<String>,
}

impl AuthDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Authorization service contract.
pub trait Authorizer: Send + Sync {
    /// Decides whether `subject` holds every permission in `required`.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backing policy source fails; a
    /// denied request is a successful `AuthDecision { allowed: false }`.
    fn authorize(&self, subject: &Subject, required: &[Permission]) -> Result<AuthDecision>;
}

/// Glob match with `*` (any run) and `?` (any single character).
#[must_use]
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    glob(&pattern, &name)
}

fn glob(pattern: &[char], name: &[char]) -> bool {
    match pattern.split_first() {
        None => name.is_empty(),
        Some(('*', rest)) => {
            (0..=name.len()).any(|skip| glob(rest, &name[skip..]))
        }
        Some(('?', rest)) => match name.split_first() {
            Some((_, name_rest)) => glob(rest, name_rest),
            None => false,
        },
        Some((c, rest)) => match name.split_first() {
            Some((n, name_rest)) if n == c => glob(rest, name_rest),
            _ => false,
        },
    }
}

/// Matches a resource ARN against a pattern, segment by segment.
///
/// Segments are split on `:`; each pattern segment may use wildcards.
#[must_use]
pub fn arn_match(pattern: &str, arn: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let pattern_parts: Vec<&str> = pattern.split(':').collect();
    let arn_parts: Vec<&str> = arn.split(':').collect();
    if pattern_parts.len() != arn_parts.len() {
        return false;
    }
    pattern_parts
        .iter()
        .zip(&arn_parts)
        .all(|(p, a)| wildcard_match(p, a))
}

fn interpolate_user(resource: &str, user: &str) -> String {
    resource.replace("${user}", user)
}

/// Evaluates `required` against `policies` with deny precedence.
///
/// Every required permission must be granted by at least one `Allow`
/// statement; any matching `Deny` statement fails the whole request.
#[must_use]
pub fn evaluate(subject: &Subject, required: &[Permission], policies: &[AuthPolicy]) -> AuthDecision {
    for permission in required {
        let mut allowed = false;
        for policy in policies {
            for statement in &policy.statements {
                let resource = interpolate_user(&statement.resource, &subject.user);
                if !arn_match(&resource, &permission.resource_arn) {
                    continue;
                }
                for action in &statement.actions {
                    if !wildcard_match(action, &permission.action) {
                        continue;
                    }
                    if statement.effect == StatementEffect::Deny {
                        return AuthDecision::deny(format!(
                            "action {} on {} denied by policy {}",
                            permission.action, permission.resource_arn, policy.name
                        ));
                    }
                    allowed = true;
                }
            }
        }
        if !allowed {
            return AuthDecision::deny(format!(
                "no policy grants {} on {}",
                permission.action, permission.resource_arn
            ));
        }
    }
    AuthDecision::allow()
}

/// In-memory authorizer over statically attached policies.
///
/// The backing user/group service is external; this implementation serves
/// embedded deployments and tests.
#[derive(Debug, Default)]
pub struct StaticAuthorizer {
    attachments: RwLock<HashMap<String, Vec<AuthPolicy>>>,
}

impl StaticAuthorizer {
    /// Creates an authorizer with no attachments (denies everything).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a policy to a user.
    pub fn attach(&self, user: impl Into<String>, policy: AuthPolicy) {
        self.attachments
            .write()
            .entry(user.into())
            .or_default()
            .push(policy);
    }
}

impl Authorizer for StaticAuthorizer {
    fn authorize(&self, subject: &Subject, required: &[Permission]) -> Result<AuthDecision> {
        let attachments = self.attachments.read();
        let policies = attachments
            .get(&subject.user)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(evaluate(subject, required, policies))
    }
}

/// Process-wide, read-mostly decision cache with a configurable TTL.
///
/// Invalidation on policy writes is best-effort: callers should invoke
/// [`CachedAuthorizer::invalidate`] after mutating policies, and stale
/// entries age out within the TTL regardless.
pub struct CachedAuthorizer<A> {
    inner: A,
    ttl: Duration,
    cache: RwLock<HashMap<(Subject, Vec<Permission>), (Instant, AuthDecision)>>,
}

impl<A: Authorizer> CachedAuthorizer<A> {
    /// Wraps `inner` with a TTL cache.
    #[must_use]
    pub fn new(inner: A, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Drops all cached decisions.
    pub fn invalidate(&self) {
        self.cache.write().clear();
    }
}

impl<A: Authorizer> Authorizer for CachedAuthorizer<A> {
    fn authorize(&self, subject: &Subject, required: &[Permission]) -> Result<AuthDecision> {
        let key = (subject.clone(), required.to_vec());
        if let Some((at, decision)) = self.cache.read().get(&key) {
            if at.elapsed() < self.ttl {
                return Ok(decision.clone());
            }
        }
        let decision = self.inner.authorize(subject, required)?;
        self.cache
            .write()
            .insert(key, (Instant::now(), decision.clone()));
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_policy() -> AuthPolicy {
        AuthPolicy {
            name: "read-all".to_string(),
            statements: vec![PolicyStatement {
                effect: StatementEffect::Allow,
                actions: vec!["repos:Read*".to_string()],
                resource: "arn:verso:repos:::*".to_string(),
            }],
        }
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("repos:Read*", "repos:ReadObject"));
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("a?c", "abc"));
        assert!(!wildcard_match("a?c", "ac"));
        assert!(!wildcard_match("repos:Write*", "repos:ReadObject"));
    }

    #[test]
    fn test_allow_requires_every_permission() {
        let subject = Subject::new("alice");
        let policies = [read_policy()];

        let read = Permission::new("repos:ReadObject", "arn:verso:repos:::repo1");
        let write = Permission::new("repos:WriteObject", "arn:verso:repos:::repo1");

        assert!(evaluate(&subject, &[read.clone()], &policies).allowed);
        let decision = evaluate(&subject, &[read, write], &policies);
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("repos:WriteObject"));
    }

    #[test]
    fn test_deny_takes_precedence() {
        let subject = Subject::new("alice");
        let mut policies = vec![read_policy()];
        policies.push(AuthPolicy {
            name: "deny-secrets".to_string(),
            statements: vec![PolicyStatement {
                effect: StatementEffect::Deny,
                actions: vec!["repos:ReadObject".to_string()],
                resource: "arn:verso:repos:::secret-*".to_string(),
            }],
        });

        let open = Permission::new("repos:ReadObject", "arn:verso:repos:::repo1");
        assert!(evaluate(&subject, &[open], &policies).allowed);

        let secret = Permission::new("repos:ReadObject", "arn:verso:repos:::secret-repo");
        let decision = evaluate(&subject, &[secret], &policies);
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("deny-secrets"));
    }

    #[test]
    fn test_user_interpolation() {
        let policy = AuthPolicy {
            name: "own-prefix".to_string(),
            statements: vec![PolicyStatement {
                effect: StatementEffect::Allow,
                actions: vec!["repos:*".to_string()],
                resource: "arn:verso:repos:::home/${user}/*".to_string(),
            }],
        };
        let own = Permission::new("repos:WriteObject", "arn:verso:repos:::home/bob/file");
        let other = Permission::new("repos:WriteObject", "arn:verso:repos:::home/eve/file");

        assert!(evaluate(&Subject::new("bob"), &[own.clone()], &[policy.clone()]).allowed);
        assert!(!evaluate(&Subject::new("bob"), &[other], &[policy.clone()]).allowed);
        assert!(!evaluate(&Subject::new("eve"), &[own], &[policy]).allowed);
    }

    #[test]
    fn test_static_authorizer_scopes_by_user() {
        let authorizer = StaticAuthorizer::new();
        authorizer.attach("alice", read_policy());

        let permission = [Permission::new("repos:ReadObject", "arn:verso:repos:::r")];
        assert!(
            authorizer
                .authorize(&Subject::new("alice"), &permission)
                .unwrap()
                .allowed
        );
        assert!(
            !authorizer
                .authorize(&Subject::new("mallory"), &permission)
                .unwrap()
                .allowed
        );
    }

    #[test]
    fn test_cached_authorizer_serves_and_invalidates() {
        let inner = StaticAuthorizer::new();
        inner.attach("alice", read_policy());
        let cached = CachedAuthorizer::new(inner, Duration::from_secs(60));

        let permission = [Permission::new("repos:ReadObject", "arn:verso:repos:::r")];
        let subject = Subject::new("alice");
        assert!(cached.authorize(&subject, &permission).unwrap().allowed);
        // Served from cache; then invalidation clears it without breaking.
        assert!(cached.authorize(&subject, &permission).unwrap().allowed);
        cached.invalidate();
        assert!(cached.authorize(&subject, &permission).unwrap().allowed);
    }
}
