use bakery::checker::{DeclaredChecker, check_first_party_caveats, infer_declared};
use bakery::location::local_third_party_caveat;
use bakery::{Caveat, KeyPair, Macaroon, Namespace, Version, discharge_all_with_key};
use tokio_util::sync::CancellationToken;

#[tokio::main(flavor = "current_thread")]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    println!("=== Locally Discharged Caveats ===\n");

    let ctx = CancellationToken::new();
    let root_key = b"service_root_secret";
    let service_key = KeyPair::generate()?;
    let client_key = KeyPair::generate()?;

    // The service ties the macaroon to the client's key: only the holder of
    // the matching private key can discharge it.
    println!("1. Service mints a macaroon bound to the client's public key");
    let mut m = Macaroon::new(
        root_key,
        b"session-12345",
        Some("https://api.service.com"),
        Version::LATEST,
        Some(Namespace::legacy()),
    )?;
    m.add_caveat(&ctx, Caveat::declared("user", "alice"), None, None)
        .await?;
    m.add_caveat(
        &ctx,
        local_third_party_caveat(client_key.public_key(), Version::LATEST),
        Some(&service_key),
        None,
    )
    .await?;
    for caveat in m.caveats() {
        match &caveat.location {
            Some(location) => println!("   - third party at {location:?}"),
            None => println!("   - {}", String::from_utf8_lossy(&caveat.caveat_id)),
        }
    }

    println!("\n2. Verifying without a discharge...");
    match m.raw().verify_signature(root_key, &[]) {
        Ok(_) => println!("   unexpectedly succeeded"),
        Err(e) => println!("   failed as expected: {e}"),
    }

    println!("\n3. Client discharges the local caveat with its own key");
    let ms = discharge_all_with_key(&ctx, &m, None, &client_key).await?;
    println!("   got {} macaroons to send", ms.len());

    println!("\n4. Service verifies the request");
    let conditions = ms[0].verify_signature(root_key, &ms[1..])?;
    let checker = DeclaredChecker::new(infer_declared(&conditions));
    check_first_party_caveats(&ctx, &checker, &conditions).await?;
    println!("   verified, conditions: {conditions:?}");

    println!("\n5. A different key cannot discharge it");
    let stranger = KeyPair::generate()?;
    match discharge_all_with_key(&ctx, &m, None, &stranger).await {
        Ok(_) => println!("   unexpectedly succeeded"),
        Err(e) => println!("   failed as expected: {e}"),
    }

    Ok(())
}
