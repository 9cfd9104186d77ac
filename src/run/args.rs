use crate::stats::Spsa;
use crate::stats::Sprt;
use serde::Deserialize;
use serde::Serialize;

use super::TimeControl;

/// exactly one stopping rule per run: a sequential test, a tuning session,
/// or a fixed number of games
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopRule {
    Sprt(Sprt),
    Spsa(Spsa),
    Games,
}

/// submitted run arguments, validated at the boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunArgs {
    pub base_tag: String,
    pub new_tag: String,
    pub num_games: u64,
    pub tc: String,
    pub book: String,
    pub book_depth: u32,
    pub threads: u64,
    pub base_options: String,
    pub new_options: String,
    pub base_signature: String,
    pub new_signature: String,
    pub username: String,
    #[serde(default)]
    pub info: String,
    pub auto_purge: bool,
    pub throughput: u64,
    pub priority: i64,
    #[serde(default = "default_itp")]
    pub itp: f64,
    pub stop_rule: StopRule,
}

fn default_itp() -> f64 {
    100.0
}

impl RunArgs {
    pub fn sprt(&self) -> Option<&Sprt> {
        match self.stop_rule {
            StopRule::Sprt(ref sprt) => Some(sprt),
            _ => None,
        }
    }

    pub fn sprt_mut(&mut self) -> Option<&mut Sprt> {
        match self.stop_rule {
            StopRule::Sprt(ref mut sprt) => Some(sprt),
            _ => None,
        }
    }

    pub fn spsa(&self) -> Option<&Spsa> {
        match self.stop_rule {
            StopRule::Spsa(ref spsa) => Some(spsa),
            _ => None,
        }
    }

    pub fn spsa_mut(&mut self) -> Option<&mut Spsa> {
        match self.stop_rule {
            StopRule::Spsa(ref mut spsa) => Some(spsa),
            _ => None,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !TimeControl::valid(&self.tc) {
            anyhow::bail!("bad time control format: {}", self.tc);
        }
        if self.num_games == 0 {
            anyhow::bail!("number of games must be > 0");
        }
        if self.num_games > crate::MAX_CHUNKS * crate::CHUNK_SIZE {
            anyhow::bail!(
                "number of games must be <= {}",
                crate::MAX_CHUNKS * crate::CHUNK_SIZE
            );
        }
        if self.threads == 0 {
            anyhow::bail!("thread count must be > 0");
        }
        if !(1..=500).contains(&self.throughput) {
            anyhow::bail!("throughput must lie in 1..=500");
        }
        match self.stop_rule {
            StopRule::Sprt(ref sprt) => {
                if sprt.batch_size == 0 || crate::CHUNK_SIZE % (2 * sprt.batch_size) != 0 {
                    anyhow::bail!("sprt batch size must evenly divide the chunk size");
                }
            }
            StopRule::Spsa(ref spsa) => {
                if spsa.params.is_empty() {
                    anyhow::bail!("spsa run without tuning parameters");
                }
            }
            StopRule::Games => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::EloModel;

    pub fn args(stop_rule: StopRule) -> RunArgs {
        RunArgs {
            base_tag: "master".to_string(),
            new_tag: "patch".to_string(),
            num_games: 4000,
            tc: "10+0.1".to_string(),
            book: "openings-8moves.epd".to_string(),
            book_depth: 8,
            threads: 1,
            base_options: "Hash=16".to_string(),
            new_options: "Hash=16".to_string(),
            base_signature: "1234567".to_string(),
            new_signature: "7654321".to_string(),
            username: "submitter".to_string(),
            info: String::new(),
            auto_purge: true,
            throughput: 100,
            priority: 0,
            itp: 100.0,
            stop_rule,
        }
    }

    #[test]
    fn fixed_games_args_validate() {
        assert!(args(StopRule::Games).validate().is_ok());
    }

    #[test]
    fn bad_tc_is_rejected() {
        let mut a = args(StopRule::Games);
        a.tc = "10+".to_string();
        assert!(a.validate().is_err());
    }

    #[test]
    fn game_count_is_capped() {
        let mut a = args(StopRule::Games);
        a.num_games = crate::MAX_CHUNKS * crate::CHUNK_SIZE + 1;
        assert!(a.validate().is_err());
    }

    #[test]
    fn sprt_batch_must_divide_the_chunk() {
        let sprt = |batch| StopRule::Sprt(Sprt::new(0.05, 0.05, 0.0, 5.0, EloModel::Logistic, batch));
        assert!(args(sprt(4)).validate().is_ok());
        assert!(args(sprt(3)).validate().is_err());
        assert!(args(sprt(0)).validate().is_err());
    }
}
