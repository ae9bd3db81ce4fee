//! Client-side gathering of discharge macaroons.

use crate::checker::{ThirdPartyCaveatChecker, ThirdPartyCaveatCheckerFn};
use crate::discharge::{CaveatEncoding, DischargeParams, discharge};
use crate::keys::KeyPair;
use crate::location::LOCAL_LOCATION;
use crate::macaroon::Macaroon;
use crate::raw::{RawCaveat, RawMacaroon};
use crate::{BakeryError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Obtains discharge macaroons for third-party caveats, typically by asking
/// the discharger at the caveat's location.
#[async_trait]
pub trait DischargeAcquirer: Send + Sync {
    /// Returns a discharge for `caveat`.
    ///
    /// `payload` is the encoded caveat when it is stored apart from the
    /// caveat id; otherwise the caveat id is the encoded caveat.
    async fn acquire_discharge(
        &self,
        ctx: &CancellationToken,
        caveat: &RawCaveat,
        payload: Option<&[u8]>,
    ) -> Result<Macaroon>;
}

/// Gathers discharges for every third-party caveat of `m`, including those
/// added by the discharges themselves.
///
/// # Returns
/// `m` followed by every discharge, each bound to `m`, ready to be sent
/// with a request.
pub async fn discharge_all(
    ctx: &CancellationToken,
    m: &Macaroon,
    acquirer: &dyn DischargeAcquirer,
) -> Result<Vec<RawMacaroon>> {
    gather(ctx, m, Some(acquirer), None).await
}

/// Like [`discharge_all`], but caveats at the `local` location are
/// discharged in-process with `local_key` instead of through `acquirer`.
///
/// Without an acquirer, any non-local third-party caveat is an error.
pub async fn discharge_all_with_key(
    ctx: &CancellationToken,
    m: &Macaroon,
    acquirer: Option<&dyn DischargeAcquirer>,
    local_key: &KeyPair,
) -> Result<Vec<RawMacaroon>> {
    gather(ctx, m, acquirer, Some(local_key)).await
}

async fn gather(
    ctx: &CancellationToken,
    m: &Macaroon,
    acquirer: Option<&dyn DischargeAcquirer>,
    local_key: Option<&KeyPair>,
) -> Result<Vec<RawMacaroon>> {
    let primary = m.raw();
    let mut result = vec![primary.clone()];
    let mut need: VecDeque<(RawCaveat, Option<Vec<u8>>)> = pending_caveats(m).collect();

    while let Some((caveat, payload)) = need.pop_front() {
        let location = caveat.location.clone().unwrap_or_default();
        debug!(%location, "acquiring discharge");

        let acquired = match (local_key, acquirer) {
            (Some(key), _) if location == LOCAL_LOCATION => {
                discharge_local(ctx, &caveat, payload.as_deref(), key).await
            }
            (_, Some(acquirer)) => {
                acquirer
                    .acquire_discharge(ctx, &caveat, payload.as_deref())
                    .await
            }
            (_, None) => Err(BakeryError::ThirdPartyNotFound(location.clone())),
        };
        let dm = acquired.map_err(|e| e.note(format!("cannot get discharge from {location:?}")))?;

        need.extend(pending_caveats(&dm));
        result.push(primary.bind_for_request(dm.raw()));
    }
    Ok(result)
}

fn pending_caveats(m: &Macaroon) -> impl Iterator<Item = (RawCaveat, Option<Vec<u8>>)> + '_ {
    m.raw().third_party_caveats().map(move |caveat| {
        let payload = m.caveat_data(&caveat.caveat_id).map(<[u8]>::to_vec);
        (caveat.clone(), payload)
    })
}

async fn discharge_local(
    ctx: &CancellationToken,
    caveat: &RawCaveat,
    payload: Option<&[u8]>,
    key: &KeyPair,
) -> Result<Macaroon> {
    let checker = local_discharge_checker();
    discharge(
        ctx,
        DischargeParams {
            id: &caveat.caveat_id,
            caveat: match payload {
                Some(payload) => CaveatEncoding::Detached(payload.to_vec()),
                None => CaveatEncoding::InId,
            },
            key,
            checker: &checker,
            locator: None,
        },
    )
    .await
}

/// Local caveats are minted with the condition `true` and nothing else.
fn local_discharge_checker() -> impl ThirdPartyCaveatChecker {
    ThirdPartyCaveatCheckerFn::new(|_, info| {
        if info.condition == b"true" {
            Ok(Vec::new())
        } else {
            Err(BakeryError::CaveatNotRecognized(
                String::from_utf8_lossy(&info.condition).into_owned(),
            ))
        }
    })
}
