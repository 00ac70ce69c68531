//! Asset repository implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::PgPool;

use cadence_core::error::{AppError, ErrorKind};
use cadence_core::result::AppResult;
use cadence_core::traits::AssetStore;
use cadence_core::types::{AssetId, MusicalAnalysis, ProbeInfo};
use cadence_entity::asset::{Asset, CreateAsset};

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

/// PostgreSQL-backed asset store rooted at the storage data directory.
#[derive(Debug, Clone)]
pub struct AssetRepository {
    pool: PgPool,
    data_root: PathBuf,
}

impl AssetRepository {
    /// Create a new asset repository. Relative paths resolve against `data_root`.
    pub fn new(pool: PgPool, data_root: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            data_root: data_root.into(),
        }
    }

    /// Root directory that asset paths are relative to.
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Find an asset by ID.
    pub async fn find_by_id(&self, id: AssetId) -> AppResult<Option<Asset>> {
        sqlx::query_as::<_, Asset>("SELECT * FROM assets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find asset", e))
    }

    /// Register an asset.
    pub async fn create(&self, data: &CreateAsset) -> AppResult<Asset> {
        sqlx::query_as::<_, Asset>(
            "INSERT INTO assets (original_name, path) VALUES ($1, $2) RETURNING *",
        )
        .bind(&data.original_name)
        .bind(&data.path)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create asset", e))
    }

    async fn execute(&self, what: &str, query: PgQuery<'_>) -> AppResult<()> {
        let result = query.execute(&self.pool).await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, format!("Failed to record {what}"), e)
        })?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!(
                "Asset not found while recording {what}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AssetStore for AssetRepository {
    async fn resolve_path(&self, asset_id: AssetId) -> AppResult<Option<PathBuf>> {
        Ok(self
            .relative_path(asset_id)
            .await?
            .map(|relative| self.absolute(&relative)))
    }

    async fn relative_path(&self, asset_id: AssetId) -> AppResult<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT path FROM assets WHERE id = $1")
            .bind(asset_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to resolve asset path", e)
            })
    }

    fn absolute(&self, relative: &str) -> PathBuf {
        self.data_root.join(relative)
    }

    async fn record_probe(&self, asset_id: AssetId, info: &ProbeInfo) -> AppResult<()> {
        self.execute(
            "probe results",
            sqlx::query(
                "UPDATE assets SET duration_seconds = $2, format_name = $3, bit_rate = $4 \
                 WHERE id = $1",
            )
            .bind(asset_id)
            .bind(info.duration_seconds)
            .bind(&info.format_name)
            .bind(info.bit_rate),
        )
        .await
    }

    async fn record_output(&self, asset_id: AssetId, output_path: &str) -> AppResult<()> {
        self.execute(
            "output path",
            sqlx::query("UPDATE assets SET output_path = $2 WHERE id = $1")
                .bind(asset_id)
                .bind(output_path),
        )
        .await
    }

    async fn record_loudness(&self, asset_id: AssetId, lufs: f64) -> AppResult<()> {
        self.execute(
            "loudness",
            sqlx::query("UPDATE assets SET integrated_lufs = $2 WHERE id = $1")
                .bind(asset_id)
                .bind(lufs),
        )
        .await
    }

    async fn record_analysis(
        &self,
        asset_id: AssetId,
        analysis: &MusicalAnalysis,
    ) -> AppResult<()> {
        self.execute(
            "musical analysis",
            sqlx::query("UPDATE assets SET bpm = $2, musical_key = $3 WHERE id = $1")
                .bind(asset_id)
                .bind(analysis.bpm)
                .bind(&analysis.key),
        )
        .await
    }

    async fn record_waveform(&self, asset_id: AssetId, waveform_path: &str) -> AppResult<()> {
        self.execute(
            "waveform path",
            sqlx::query("UPDATE assets SET waveform_path = $2 WHERE id = $1")
                .bind(asset_id)
                .bind(waveform_path),
        )
        .await
    }
}
