use anyhow::Result;
use log::info;
use std::env;
use std::path::PathBuf;

use customization_cases::case_store;
use customization_cases::db_connect;
use customization_cases::env_loader;
use customization_cases::image_audit;

#[tokio::main]
async fn main() -> Result<()> {
    env_loader::load_env();
    env_logger::init();

    let image_dir = env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| env::var("CASES_IMAGE_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("static/images"));

    info!("Checking photo references against {:?}", image_dir);

    let pool = db_connect::connect().await?;
    let records = case_store::fetch_all_records(&pool).await?;
    let local = image_audit::list_local_images(&image_dir)?;

    let result = image_audit::audit(
        records.iter().filter_map(|r| r.photo_reference.as_deref()),
        local.iter().map(String::as_str),
    );

    println!("\n--- Image reference check ---");
    if result.missing_locally.is_empty() {
        println!("✅ Every referenced photo exists in {:?}.", image_dir);
    } else {
        println!("❌ Referenced in the store but missing from {:?}:", image_dir);
        for name in &result.missing_locally {
            println!("   - {}", name);
        }
    }

    if result.unreferenced.is_empty() {
        println!("✅ Every file in {:?} is referenced by a record.", image_dir);
    } else {
        println!("⚠️  Present in {:?} but referenced by no record:", image_dir);
        for name in &result.unreferenced {
            println!("   - {}", name);
        }
    }

    if result.case_mismatches.is_empty() {
        println!("✅ No letter-case mismatches.");
    } else {
        println!("⚠️  Letter case differs between store and disk:");
        for (reference, file) in &result.case_mismatches {
            println!("   - store: '{}' vs disk: '{}'", reference, file);
        }
        println!("   -> Use lower-case file names everywhere.");
    }

    if !result.is_clean() {
        println!("\nFix the issues above and re-import the records.");
        std::process::exit(1);
    }
    Ok(())
}
