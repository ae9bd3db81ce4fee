use bakery::checker::{
    DeclaredChecker, ThirdPartyCaveatCheckerFn, check_first_party_caveats, infer_declared,
};
use bakery::location::ThirdPartyStore;
use bakery::{
    BakeryError, Caveat, CaveatEncoding, DischargeParams, KeyPair, Macaroon, Namespace,
    ThirdPartyInfo, Version, discharge,
};
use tokio_util::sync::CancellationToken;

const AUTH: &str = "https://auth.service.com";

#[tokio::main(flavor = "current_thread")]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    println!("=== Need-Declared Caveats ===\n");

    let ctx = CancellationToken::new();
    let root_key = b"service_root_secret";
    let service_key = KeyPair::generate()?;
    let auth_key = KeyPair::generate()?;

    let locator = ThirdPartyStore::new();
    locator.add_info(
        AUTH,
        ThirdPartyInfo {
            public_key: *auth_key.public_key(),
            version: Version::LATEST,
        },
    );

    // The service wants to know who the user is and which group they are in;
    // the auth service must declare both, even if only as empty values.
    println!("1. Service adds a need-declared caveat for the auth service");
    let mut m = Macaroon::new(
        root_key,
        b"session-67890",
        Some("https://api.service.com"),
        Version::LATEST,
        Some(Namespace::legacy()),
    )?;
    m.add_caveat(
        &ctx,
        Caveat::need_declared(
            Caveat::third_party("is-authenticated-user", AUTH),
            &["user", "group"],
        ),
        Some(&service_key),
        Some(&locator),
    )
    .await?;

    println!("\n2. Auth service discharges the caveat");
    let checker = ThirdPartyCaveatCheckerFn::new(|_, info| {
        let condition = String::from_utf8_lossy(&info.condition);
        println!("   checker sees condition {condition:?}");
        if condition == "is-authenticated-user" {
            Ok(vec![Caveat::declared("user", "alice")])
        } else {
            Err(BakeryError::CaveatNotRecognized(condition.into_owned()))
        }
    });
    let caveat = &m.caveats()[0];
    let dm = discharge(
        &ctx,
        DischargeParams {
            id: &caveat.caveat_id,
            caveat: match m.caveat_data(&caveat.caveat_id) {
                Some(payload) => CaveatEncoding::Detached(payload.to_vec()),
                None => CaveatEncoding::InId,
            },
            key: &auth_key,
            checker: &checker,
            locator: Some(&locator),
        },
    )
    .await?;
    for caveat in dm.caveats() {
        println!("   discharge caveat: {}", String::from_utf8_lossy(&caveat.caveat_id));
    }

    println!("\n3. Service verifies and reads the declarations");
    let ms = m.raw().prepare_for_request(vec![dm.into_raw()]);
    let conditions = ms[0].verify_signature(root_key, &ms[1..])?;
    let declared = infer_declared(&conditions);
    check_first_party_caveats(&ctx, &DeclaredChecker::new(declared.clone()), &conditions).await?;
    println!("   user  = {:?}", declared.get("user"));
    println!("   group = {:?} (declared empty by the discharger)", declared.get("group"));

    Ok(())
}
