//! Interfaces des services distants consommés par le pipeline

use crate::error::ApiError;
use crate::models::{ContinuationPage, NextPage, PlayerResponse, RadioSeed};
use async_trait::async_trait;

/// Résolution d'une clé de piste en formats jouables
#[async_trait]
pub trait ResolutionClient: Send + Sync {
    async fn player(&self, track_key: &str) -> Result<PlayerResponse, ApiError>;
}

/// Pages de pistes suivantes (radio)
#[async_trait]
pub trait ContinuationClient: Send + Sync {
    /// Première page à partir des paramètres de départ
    async fn first_page(&self, seed: &RadioSeed) -> Result<NextPage, ApiError>;

    /// Page suivante à partir d'un jeton de continuation
    async fn continuation_page(&self, token: &str) -> Result<ContinuationPage, ApiError>;
}
