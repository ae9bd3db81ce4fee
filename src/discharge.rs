use crate::caveat::Caveat;
use crate::checker::ThirdPartyCaveatChecker;
use crate::codec::{ThirdPartyCaveatInfo, decode_caveat};
use crate::condition::{COND_DECLARED, COND_NEED_DECLARED, parse_caveat};
use crate::keys::KeyPair;
use crate::location::ThirdPartyLocator;
use crate::macaroon::Macaroon;
use crate::{BakeryError, Result};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Where the encoded third-party caveat of a discharge request lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaveatEncoding {
    /// The discharge id is itself the encoded caveat
    InId,

    /// The encoded caveat was sent separately from the discharge id.
    ///
    /// The id then also prefixes the ids of any third-party caveats added to
    /// the discharge.
    Detached(Vec<u8>),
}

/// Parameters for [`discharge`]
pub struct DischargeParams<'a> {
    /// Id to give the discharge macaroon
    pub id: &'a [u8],

    /// The encoded third-party caveat
    pub caveat: CaveatEncoding,

    /// Key pair used to decrypt the caveat and to encrypt any third-party
    /// caveats the checker returns
    pub key: &'a KeyPair,

    /// Checks the caveat's condition and may return caveats to add to the
    /// discharge
    pub checker: &'a dyn ThirdPartyCaveatChecker,

    /// Locates the third parties named by caveats the checker returns
    pub locator: Option<&'a dyn ThirdPartyLocator>,
}

/// Creates a macaroon that discharges a third-party caveat.
///
/// The caveat is decoded with `params.key` and its condition checked with
/// `params.checker`. On success the returned discharge is minted with the
/// caveat's root key, carries `params.id` and holds the caveats the checker
/// returned, in order. Its version is the one the caveat was encoded with.
///
/// Errors from the checker are returned unchanged.
pub async fn discharge(ctx: &CancellationToken, params: DischargeParams<'_>) -> Result<Macaroon> {
    let (encoded, caveat_id_prefix) = match &params.caveat {
        CaveatEncoding::InId => (params.id, Vec::new()),
        CaveatEncoding::Detached(caveat) => (caveat.as_slice(), params.id.to_vec()),
    };

    let mut info = decode_caveat(params.key, encoded).map_err(BakeryError::decode_failed)?;
    info.id = params.id.to_vec();

    // Conditions we cannot parse still go to the checker; it may know them.
    let need_declared = std::str::from_utf8(&info.condition)
        .ok()
        .and_then(|c| parse_caveat(c).ok())
        .filter(|(verb, _)| *verb == COND_NEED_DECLARED)
        .map(|(_, arg)| arg.to_string());

    debug!(
        version = %info.version,
        need_declared = need_declared.is_some(),
        "checking third-party caveat"
    );
    let caveats = match need_declared {
        Some(arg) => {
            info.condition = arg.into_bytes();
            check_need_declared(ctx, &mut info, params.checker).await?
        }
        None => params.checker.check_third_party_caveat(ctx, &info).await?,
    };

    // The discharge is never stored: a stored discharge could later be
    // presented to its issuer as an ordinary macaroon.
    let mut m = Macaroon::new(
        &info.root_key,
        params.id,
        None::<String>,
        info.version,
        info.namespace.take(),
    )?;
    m.set_caveat_id_prefix(caveat_id_prefix);

    for caveat in caveats {
        m.add_caveat(ctx, caveat, Some(params.key), params.locator)
            .await
            .map_err(BakeryError::add_caveat_failed)?;
    }
    debug!(caveats = m.caveats().len(), "discharge minted");
    Ok(m)
}

/// Checks a need-declared condition.
///
/// `info.condition` holds the argument: a comma-separated list of required
/// attributes, a space, then the wrapped condition. The checker sees the
/// wrapped condition; every required attribute it did not declare gets an
/// empty declaration appended to its caveats.
pub(crate) async fn check_need_declared(
    ctx: &CancellationToken,
    info: &mut ThirdPartyCaveatInfo,
    checker: &dyn ThirdPartyCaveatChecker,
) -> Result<Vec<Caveat>> {
    let arg = String::from_utf8_lossy(&info.condition).into_owned();
    let (attrs, wrapped) = match arg.find(' ') {
        Some(i) if i > 0 => (&arg[..i], &arg[i + 1..]),
        _ => {
            return Err(BakeryError::MalformedNeedDeclared(format!(
                "need-declared caveat requires an argument, got {arg:?}"
            )));
        }
    };

    let need_declared: Vec<&str> = attrs.split(',').collect();
    if need_declared.iter().any(|d| d.is_empty()) {
        return Err(BakeryError::MalformedNeedDeclared(
            "need-declared caveat with empty required attribute".to_string(),
        ));
    }

    info.condition = wrapped.as_bytes().to_vec();
    let mut caveats = checker.check_third_party_caveat(ctx, info).await?;

    let mut declared = HashSet::new();
    for caveat in caveats.iter().filter(|c| c.is_first_party()) {
        let Ok((COND_DECLARED, arg)) = parse_caveat(&caveat.condition) else {
            continue;
        };
        let (name, _value) = arg.split_once(' ').ok_or_else(|| {
            BakeryError::MalformedNeedDeclared("declared caveat has no value".to_string())
        })?;
        declared.insert(name.to_string());
    }

    for name in need_declared {
        if !declared.contains(name) {
            caveats.push(Caveat::declared(name, ""));
        }
    }
    Ok(caveats)
}
