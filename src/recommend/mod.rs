//! Picking the next track when DJ mode is on and nobody queued anything.

pub mod llm;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::seq::SliceRandom;
use serenity::model::id::{
    ChannelId as DiscordChannelId,
    GuildId as DiscordGuildId,
    UserId as DiscordUserId
};
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, info};
use crate::{
    error::{RecommendationError, RecommendationResult},
    history::HistoryStore,
    model::{Popularity, SongPick, Track},
    resolver::AudioResolver
};

pub use llm::{LlmClient, OpenAiClient};

pub const DEFAULT_CANDIDATE_LIMIT: u32 = 100;
pub const DEFAULT_SEED_COUNT: u32 = 5;

/// Who is listening and where, for one `select_next` call.
#[derive(Debug, Clone)]
pub struct Selection {
    pub guild: DiscordGuildId,
    pub listeners: Vec<DiscordUserId>,
    pub channels: Vec<DiscordChannelId>,
    /// Plays at or after this instant are "recent".
    pub cutoff: DateTime<Utc>,
    pub limit: u32
}

impl Selection {
    pub fn new(guild: DiscordGuildId, listeners: Vec<DiscordUserId>, channels: Vec<DiscordChannelId>) -> Self {
        Self {
            guild,
            listeners,
            channels,
            cutoff: Utc::now() - ChronoDuration::hours(1),
            limit: DEFAULT_CANDIDATE_LIMIT
        }
    }

    pub fn cutoff(mut self, cutoff: DateTime<Utc>) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

pub struct RecommendationEngine {
    history: Arc<dyn HistoryStore>,
    resolver: Arc<AudioResolver>,
    llm: Option<Arc<dyn LlmClient>>,
    seed_count: u32
}

impl RecommendationEngine {
    pub fn new(history: Arc<dyn HistoryStore>, resolver: Arc<AudioResolver>, llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            history,
            resolver,
            llm,
            seed_count: DEFAULT_SEED_COUNT
        }
    }

    pub fn set_seed_count(&mut self, seed_count: u32) -> &mut Self {
        self.seed_count = seed_count;
        self
    }

    /// Chooses a pair and resolves it into a playable track.
    pub async fn select_next(&self, selection: &Selection) -> RecommendationResult<Track> {
        let pick = self.choose(selection).await?;

        info!("Recommending {} for guild {}", pick, selection.guild);

        Ok(self.resolver.create_from_pick(&pick, None).await?)
    }

    /// The selection itself, without resolution.
    pub async fn choose(&self, selection: &Selection) -> RecommendationResult<SongPick> {
        let candidates = self.history
            .query_popularity(&selection.listeners, &selection.channels, selection.cutoff, selection.limit)
            .await?;
        let recent: HashSet<SongPick> = self.history
            .query_recent(&selection.channels, selection.cutoff)
            .await?
            .into_iter()
            .collect();

        let filtered = exclude_recent(candidates, &recent);
        debug!("{} candidates left for guild {} after excluding {} recent songs", filtered.len(), selection.guild, recent.len());

        let picked = {
            let mut rng = rand::thread_rng();
            filtered.choose(&mut rng).cloned()
        };

        if let Some(pick) = picked {
            return Ok(pick);
        }

        let pick = self.ask_llm(&selection.channels).await?;

        if recent.contains(&pick) {
            return Err(RecommendationError::Repeated(pick.to_string()));
        }

        Ok(pick)
    }

    async fn ask_llm(&self, channels: &[DiscordChannelId]) -> RecommendationResult<SongPick> {
        let seeds = self.history.query_last_finished(channels, self.seed_count).await?;

        if seeds.is_empty() {
            return Err(RecommendationError::NoHistory);
        }

        let llm = self.llm
            .as_ref()
            .ok_or_else(|| RecommendationError::Service("no LLM client configured".to_string()))?;

        let reply = llm.complete(llm::INSTRUCTION, &llm::seed_prompt(&seeds)).await?;
        debug!("LLM replied {:?}", reply);

        llm::parse_reply(&reply)
    }
}

/// Candidates minus the exclusion set, popularity order preserved.
pub fn exclude_recent(candidates: Vec<Popularity>, recent: &HashSet<SongPick>) -> Vec<SongPick> {
    candidates
        .into_iter()
        .map(|candidate| candidate.pick)
        .filter(|pick| !recent.contains(pick))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_pairs_are_dropped() {
        let candidates = vec![
            Popularity { pick: SongPick::new("A", "X"), plays: 5 },
            Popularity { pick: SongPick::new("B", "Y"), plays: 2 },
            Popularity { pick: SongPick::new("A", "Z"), plays: 1 },
        ];
        let recent: HashSet<SongPick> = [SongPick::new("A", "X")].into_iter().collect();

        assert_eq!(exclude_recent(candidates, &recent), vec![SongPick::new("B", "Y"), SongPick::new("A", "Z")]);
    }
}
