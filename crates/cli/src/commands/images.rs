//! Product image migration.
//!
//! Uploads each image file in a directory to the product bucket (overwriting
//! what is there) and repoints products whose image still refers to the old
//! file name. Running it again uploads the same bytes and repoints nothing.
//!
//! # Usage
//!
//! ```bash
//! oja images migrate ./public/images
//! ```
//!
//! # Environment Variables
//!
//! - `OJA_BACKEND_SERVICE_KEY` - required; uploads bypass row security
//! - `OJA_IMAGE_BUCKET` - target bucket (default `product-images`)

use std::path::{Path, PathBuf};

use oja_admin::AdminConsole;
use oja_admin::console::content_type_for;

use super::CliError;

/// Counts reported at the end of a migration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MigrationSummary {
    pub uploaded: usize,
    pub repointed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Migrate every image in `dir`.
///
/// A file that fails to read or upload is logged and counted; the rest of
/// the directory is still processed.
pub async fn migrate(console: &AdminConsole, dir: &Path) -> Result<MigrationSummary, CliError> {
    let files = image_files(dir)?;
    let mut summary = MigrationSummary::default();
    tracing::info!("Migrating {} files from {}", files.len(), dir.display());

    for path in files {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            summary.skipped += 1;
            continue;
        };
        if content_type_for(name) == "application/octet-stream" {
            tracing::debug!(file = name, "Not an image, skipping");
            summary.skipped += 1;
            continue;
        }

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(file = name, error = %e, "Could not read file");
                summary.failed += 1;
                continue;
            }
        };

        let url = match console.upload_product_image(name, bytes).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(file = name, error = %e, "Upload failed");
                summary.failed += 1;
                continue;
            }
        };
        summary.uploaded += 1;

        match console.repoint_product_images(name, &url).await {
            Ok(count) => {
                summary.repointed += count;
                tracing::info!(file = name, products = count, "Uploaded");
            }
            Err(e) => {
                tracing::warn!(
                    file = name,
                    error = %e,
                    "Uploaded, but products were not repointed"
                );
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        "Migration complete: {} uploaded, {} products repointed, {} skipped, {} failed",
        summary.uploaded,
        summary.repointed,
        summary.skipped,
        summary.failed
    );
    Ok(summary)
}

/// Regular files directly inside `dir`, sorted by name.
fn image_files(dir: &Path) -> Result<Vec<PathBuf>, CliError> {
    let io_error = |source| CliError::Io {
        path: dir.display().to_string(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        if entry.file_type().map_err(io_error)?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::commands::tests::admin_console;
    use oja_core::{Naira, Product, ProductId};
    use oja_storefront::backend::HostedStore;
    use oja_storefront::backend::ProductPatch;

    #[tokio::test]
    async fn test_migrate_uploads_and_repoints_once() {
        let (store, console) = admin_console().await;
        for (id, image) in [("p1", "/images/ankara.jpg"), ("p2", "/images/kaftan.png")] {
            store
                .insert_product(&ProductPatch {
                    id: Some(ProductId::from(id)),
                    name: Some(format!("Item {id}")),
                    price: Some(Naira::whole(1000)),
                    image_url: Some(image.to_string()),
                    ..ProductPatch::default()
                })
                .await
                .unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ankara.jpg"), b"jpg").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hi").unwrap();

        let summary = migrate(&console, dir.path()).await.unwrap();
        assert_eq!(
            summary,
            MigrationSummary {
                uploaded: 1,
                repointed: 1,
                skipped: 1,
                failed: 0,
            }
        );
        assert_eq!(store.object("product-images", "ankara.jpg"), Some(b"jpg".to_vec()));

        let products: Vec<Product> = store.products();
        let p1 = products.iter().find(|p| p.id.as_str() == "p1").unwrap();
        assert_eq!(p1.image.as_deref(), Some("memory://product-images/ankara.jpg"));
        let p2 = products.iter().find(|p| p.id.as_str() == "p2").unwrap();
        assert_eq!(p2.image.as_deref(), Some("/images/kaftan.png"));

        let again = migrate(&console, dir.path()).await.unwrap();
        assert_eq!(again.repointed, 0);
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let (_store, console) = admin_console().await;
        let result = migrate(&console, Path::new("/definitely/not/here")).await;
        assert!(matches!(result, Err(CliError::Io { .. })));
    }
}
