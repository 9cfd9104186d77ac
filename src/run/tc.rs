use crate::Seconds;
use std::sync::OnceLock;

/// submission grammar: optional moves prefix, base time, optional increment
fn grammar() -> &'static regex::Regex {
    static GRAMMAR: OnceLock<regex::Regex> = OnceLock::new();
    GRAMMAR.get_or_init(|| {
        regex::Regex::new(r"^([1-9]\d*/)?\d+(\.\d+)?(\+\d+(\.\d+)?)?$").expect("valid tc grammar")
    })
}

/// a cutechess-style time control `[moves/]time[+inc]`, time in seconds
/// or `mm:ss`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeControl {
    pub moves: Option<u64>,
    pub time: Seconds,
    pub increment: Seconds,
}

impl TimeControl {
    /// strict submission-time validation
    pub fn valid(tc: &str) -> bool {
        grammar().is_match(tc)
    }

    /// leading number of the raw string, the long-time-control filter key
    pub fn base(tc: &str) -> Option<f64> {
        let digits = tc
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect::<String>();
        digits.parse().ok()
    }

    /// Expected wall-clock seconds for one game: both clocks, scaled down
    /// because games usually end early, at the fleet-measured 68 moves.
    pub fn duration(&self) -> Seconds {
        let time = match self.moves {
            Some(moves) => self.time * crate::GAME_MOVES / moves as f64,
            None => self.time,
        };
        (time + self.increment * crate::GAME_MOVES) * crate::GAME_SCALE
    }
}

impl std::str::FromStr for TimeControl {
    type Err = anyhow::Error;
    fn from_str(tc: &str) -> Result<Self, Self::Err> {
        let (body, increment) = match tc.split_once('+') {
            Some((body, inc)) => (body, inc.parse::<f64>()?),
            None => (tc, 0.0),
        };
        let (moves, clock) = match body.split_once('/') {
            Some((moves, clock)) => (Some(moves.parse::<u64>()?), clock),
            None => (None, body),
        };
        let time = match clock.split_once(':') {
            Some((minutes, seconds)) => minutes.parse::<f64>()? * 60.0 + seconds.parse::<f64>()?,
            None => clock.parse::<f64>()?,
        };
        Ok(Self {
            moves,
            time,
            increment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn duration(tc: &str) -> Seconds {
        tc.parse::<TimeControl>().unwrap().duration()
    }

    #[test]
    fn grammar_accepts_the_usual_forms() {
        assert!(TimeControl::valid("10+0.1"));
        assert!(TimeControl::valid("60"));
        assert!(TimeControl::valid("40/30"));
        assert!(TimeControl::valid("40/5+0.05"));
        assert!(TimeControl::valid("0.5"));
    }

    #[test]
    fn grammar_rejects_garbage() {
        assert!(!TimeControl::valid(""));
        assert!(!TimeControl::valid("10+"));
        assert!(!TimeControl::valid("0/10"));
        assert!(!TimeControl::valid("ten"));
        assert!(!TimeControl::valid("10 + 0.1"));
    }

    #[test]
    fn durations_match_the_fleet_model() {
        assert!((duration("10+0.1") - 30.912).abs() < 1e-9);
        assert!((duration("60+0.6") - 185.472).abs() < 1e-9);
        assert!((duration("40/30") - 93.84).abs() < 1e-9);
        assert!((duration("1:00+1") - 235.52).abs() < 1e-9);
    }

    #[test]
    fn base_takes_the_leading_number() {
        assert_eq!(TimeControl::base("60+0.6"), Some(60.0));
        assert_eq!(TimeControl::base("40/30"), Some(40.0));
        assert_eq!(TimeControl::base("0.5"), Some(0.5));
        assert_eq!(TimeControl::base("x"), None);
    }
}
