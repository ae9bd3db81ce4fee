use crate::caveat::Caveat;
use crate::codec::ThirdPartyCaveatInfo;
use crate::condition::{COND_DECLARED, COND_ERROR, STD_NAMESPACE, parse_caveat};
use crate::namespace::Namespace;
use crate::{BakeryError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;

/// Checks third-party caveats on behalf of a discharger.
///
/// If the caveat is valid the checker returns the caveats to add to the
/// discharge macaroon, possibly none. If the condition is outside the
/// checker's vocabulary it must return [`BakeryError::CaveatNotRecognized`].
///
/// A checker that waits on other services should observe `ctx` and return
/// promptly once it is cancelled.
#[async_trait]
pub trait ThirdPartyCaveatChecker: Send + Sync {
    async fn check_third_party_caveat(
        &self,
        ctx: &CancellationToken,
        info: &ThirdPartyCaveatInfo,
    ) -> Result<Vec<Caveat>>;
}

/// A [`ThirdPartyCaveatChecker`] backed by a plain function
///
/// # Example
/// ```
/// use bakery::checker::ThirdPartyCaveatCheckerFn;
/// use bakery::{BakeryError, Caveat};
///
/// let checker = ThirdPartyCaveatCheckerFn::new(|_ctx, info| {
///     if info.condition == b"is-authenticated-user" {
///         Ok(vec![Caveat::declared("user", "alice")])
///     } else {
///         Err(BakeryError::CaveatNotRecognized(
///             String::from_utf8_lossy(&info.condition).into_owned(),
///         ))
///     }
/// });
/// ```
pub struct ThirdPartyCaveatCheckerFn<F>
where
    F: Fn(&CancellationToken, &ThirdPartyCaveatInfo) -> Result<Vec<Caveat>> + Send + Sync,
{
    func: F,
}

impl<F> ThirdPartyCaveatCheckerFn<F>
where
    F: Fn(&CancellationToken, &ThirdPartyCaveatInfo) -> Result<Vec<Caveat>> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> ThirdPartyCaveatChecker for ThirdPartyCaveatCheckerFn<F>
where
    F: Fn(&CancellationToken, &ThirdPartyCaveatInfo) -> Result<Vec<Caveat>> + Send + Sync,
{
    async fn check_third_party_caveat(
        &self,
        ctx: &CancellationToken,
        info: &ThirdPartyCaveatInfo,
    ) -> Result<Vec<Caveat>> {
        (self.func)(ctx, info)
    }
}

/// Tries third-party checkers in turn.
///
/// A member's answer is final unless it reports the caveat as not
/// recognized, in which case the next member is asked.
#[derive(Default)]
pub struct ThirdPartyFallback {
    checkers: Vec<Box<dyn ThirdPartyCaveatChecker>>,
}

impl ThirdPartyFallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_checker<C: ThirdPartyCaveatChecker + 'static>(mut self, checker: C) -> Self {
        self.checkers.push(Box::new(checker));
        self
    }
}

#[async_trait]
impl ThirdPartyCaveatChecker for ThirdPartyFallback {
    async fn check_third_party_caveat(
        &self,
        ctx: &CancellationToken,
        info: &ThirdPartyCaveatInfo,
    ) -> Result<Vec<Caveat>> {
        for checker in &self.checkers {
            match checker.check_third_party_caveat(ctx, info).await {
                Err(e) if e.is_caveat_not_recognized() => continue,
                result => return result,
            }
        }
        Err(BakeryError::CaveatNotRecognized(
            String::from_utf8_lossy(&info.condition).into_owned(),
        ))
    }
}

/// Checks first-party caveat conditions against the request being authorized.
///
/// Conditions outside the checker's vocabulary must be reported as
/// [`BakeryError::CaveatNotRecognized`].
#[async_trait]
pub trait FirstPartyCaveatChecker: Send + Sync {
    async fn check_first_party_caveat(
        &self,
        ctx: &CancellationToken,
        condition: &str,
    ) -> Result<()>;

    /// The namespace of the conditions this checker understands
    fn namespace(&self) -> &Namespace;
}

/// A [`FirstPartyCaveatChecker`] backed by a plain function
pub struct FirstPartyCaveatCheckerFn<F>
where
    F: Fn(&CancellationToken, &str) -> Result<()> + Send + Sync,
{
    namespace: Namespace,
    func: F,
}

impl<F> FirstPartyCaveatCheckerFn<F>
where
    F: Fn(&CancellationToken, &str) -> Result<()> + Send + Sync,
{
    pub fn new(namespace: Namespace, func: F) -> Self {
        Self { namespace, func }
    }
}

#[async_trait]
impl<F> FirstPartyCaveatChecker for FirstPartyCaveatCheckerFn<F>
where
    F: Fn(&CancellationToken, &str) -> Result<()> + Send + Sync,
{
    async fn check_first_party_caveat(
        &self,
        ctx: &CancellationToken,
        condition: &str,
    ) -> Result<()> {
        (self.func)(ctx, condition)
    }

    fn namespace(&self) -> &Namespace {
        &self.namespace
    }
}

/// Tries first-party checkers in turn, falling through on unrecognized
/// conditions. Its namespace is the union of its members' namespaces.
#[derive(Default)]
pub struct FirstPartyFallback {
    namespace: Namespace,
    checkers: Vec<Box<dyn FirstPartyCaveatChecker>>,
}

impl FirstPartyFallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_checker<C: FirstPartyCaveatChecker + 'static>(mut self, checker: C) -> Self {
        self.namespace.merge(checker.namespace());
        self.checkers.push(Box::new(checker));
        self
    }
}

#[async_trait]
impl FirstPartyCaveatChecker for FirstPartyFallback {
    async fn check_first_party_caveat(
        &self,
        ctx: &CancellationToken,
        condition: &str,
    ) -> Result<()> {
        for checker in &self.checkers {
            match checker.check_first_party_caveat(ctx, condition).await {
                Err(e) if e.is_caveat_not_recognized() => continue,
                result => return result,
            }
        }
        Err(BakeryError::CaveatNotRecognized(condition.to_string()))
    }

    fn namespace(&self) -> &Namespace {
        &self.namespace
    }
}

/// Attributes asserted by `declared` conditions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declared {
    attrs: BTreeMap<String, String>,
    conflicts: BTreeSet<String>,
}

impl Declared {
    /// Returns the declared value of `name`, unless it was declared with
    /// conflicting values
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn is_conflicting(&self, name: &str) -> bool {
        self.conflicts.contains(name)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

/// Collects the attributes declared by a list of first-party conditions.
///
/// An attribute declared twice with different values is dropped and
/// marked as conflicting. Conditions that do not parse are skipped.
pub fn infer_declared<S: AsRef<str>>(conditions: &[S]) -> Declared {
    let mut declared = Declared::default();

    for condition in conditions {
        let Ok((verb, arg)) = parse_caveat(condition.as_ref()) else {
            continue;
        };
        if verb != COND_DECLARED {
            continue;
        }
        let Some((name, value)) = arg.split_once(' ') else {
            continue;
        };
        if declared.conflicts.contains(name) {
            continue;
        }
        match declared.attrs.get(name) {
            Some(existing) if existing != value => {
                declared.attrs.remove(name);
                declared.conflicts.insert(name.to_string());
            }
            Some(_) => {}
            None => {
                declared.attrs.insert(name.to_string(), value.to_string());
            }
        }
    }
    declared
}

/// Checks `declared` conditions against the attributes inferred from the
/// macaroons being verified.
pub struct DeclaredChecker {
    namespace: Namespace,
    declared: Declared,
}

impl DeclaredChecker {
    pub fn new(declared: Declared) -> Self {
        let mut namespace = Namespace::new();
        namespace.register(STD_NAMESPACE, "");
        Self {
            namespace,
            declared,
        }
    }
}

#[async_trait]
impl FirstPartyCaveatChecker for DeclaredChecker {
    async fn check_first_party_caveat(
        &self,
        _ctx: &CancellationToken,
        condition: &str,
    ) -> Result<()> {
        let (verb, arg) = parse_caveat(condition)?;
        if verb != COND_DECLARED {
            return Err(BakeryError::CaveatNotRecognized(condition.to_string()));
        }
        let (name, value) = arg.split_once(' ').ok_or_else(|| {
            BakeryError::CaveatViolation(format!("declared caveat has no value: {condition:?}"))
        })?;

        if self.declared.is_conflicting(name) {
            return Err(BakeryError::CaveatViolation(format!(
                "got conflicting declarations for {name:?}"
            )));
        }
        match self.declared.get(name) {
            Some(declared) if declared == value => Ok(()),
            _ => Err(BakeryError::CaveatViolation(format!(
                "got {name}={:?}, expected {value:?}",
                self.declared.get(name).unwrap_or_default()
            ))),
        }
    }

    fn namespace(&self) -> &Namespace {
        &self.namespace
    }
}

/// Checks every condition with `checker`, stopping at the first failure.
///
/// `error` conditions always fail.
pub async fn check_first_party_caveats<S: AsRef<str>>(
    ctx: &CancellationToken,
    checker: &dyn FirstPartyCaveatChecker,
    conditions: &[S],
) -> Result<()> {
    for condition in conditions {
        let condition = condition.as_ref();
        if let Ok((COND_ERROR, message)) = parse_caveat(condition) {
            return Err(BakeryError::CaveatViolation(message.to_string()));
        }
        checker.check_first_party_caveat(ctx, condition).await?;
    }
    Ok(())
}
