use super::*;
use crate::stats;
use crate::stats::Status;
use serde::Deserialize;
use serde::Serialize;

/// presentation color, shared by task residuals and run styling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Green,
    Blue,
    Yellow,
    Red,
}

/// human-readable summary of a run's standing, also the source of the
/// is_green / is_yellow flags stamped at finish
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsInfo {
    pub style: Option<Color>,
    pub info: Vec<String>,
}

/// Style a run from its aggregated results.
///
/// SPSA runs show progress and take no color. Runs without both a win and
/// a loss stay pending (the estimates degenerate at 0% and 100% scores).
/// SPRT runs follow the test state; fixed-length runs call it on LOS.
pub fn format_results(results: &Stats, run: &Run) -> ResultsInfo {
    let mut info = Vec::new();
    if let Some(spsa) = run.args.spsa() {
        info.push(format!("{}/{} iterations", spsa.iter, spsa.num_iter));
        info.push(format!(
            "{}/{} games played",
            results.games(),
            run.args.num_games
        ));
        return ResultsInfo { style: None, info };
    }
    if results.wins == 0 || results.losses == 0 {
        return ResultsInfo {
            style: None,
            info: vec!["Pending...".to_string()],
        };
    }
    let state = match run.args.sprt() {
        Some(sprt) => {
            let (lower, upper) = (sprt.lower_bound(), sprt.upper_bound());
            match sprt.elo_model {
                stats::EloModel::BayesElo => info.push(format!(
                    "LLR: {:.2} ({:.2},{:.2}) [{:.2},{:.2}]",
                    sprt.llr, lower, upper, sprt.elo0, sprt.elo1
                )),
                stats::EloModel::Logistic => info.push(format!(
                    "LLR: {:.2} ({:.2},{:.2}) {{{:.2},{:.2}}}",
                    sprt.llr, lower, upper, sprt.elo0, sprt.elo1
                )),
            }
            sprt.state
        }
        None => {
            let estimate = stats::estimate(&results.frequencies());
            info.push(format!(
                "ELO: {:.2} +-{:.1} (95%) LOS: {:.1}%",
                estimate.elo,
                estimate.elo95,
                estimate.los * 100.0
            ));
            if estimate.los < 0.05 {
                Status::Rejected
            } else if estimate.los > 0.95 {
                Status::Accepted
            } else {
                Status::Open
            }
        }
    };
    info.push(format!(
        "Total: {} W: {} L: {} D: {}",
        results.games(),
        results.wins,
        results.losses,
        results.draws
    ));
    if let Some(p) = results.pentanomial {
        info.push(format!(
            "Ptnml(0-2): {}, {}, {}, {}, {}",
            p[0], p[1], p[2], p[3], p[4]
        ));
    }
    let style = match state {
        Status::Open => None,
        Status::Rejected if results.wins > results.losses => Some(Color::Yellow),
        Status::Rejected => Some(Color::Red),
        Status::Accepted => match run.args.sprt() {
            Some(sprt) if sprt.elo0 + sprt.elo1 < 0.0 => Some(Color::Blue),
            _ => Some(Color::Green),
        },
    };
    ResultsInfo { style, info }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::fixtures;
    use crate::stats::EloModel;
    use crate::stats::Sprt;

    fn results(wins: u64, losses: u64, draws: u64) -> Stats {
        Stats {
            wins,
            losses,
            draws,
            ..Default::default()
        }
    }

    #[test]
    fn no_decisive_game_is_pending() {
        let run = fixtures::run(StopRule::Games, 400);
        let info = format_results(&results(0, 0, 100), &run);
        assert_eq!(info.info, vec!["Pending...".to_string()]);
        assert_eq!(info.style, None);
    }

    #[test]
    fn spsa_shows_progress_without_color() {
        let run = fixtures::spsa_run("P,100,0,200,4,0.002", 2000);
        let info = format_results(&results(30, 30, 40), &run);
        assert_eq!(info.style, None);
        assert_eq!(info.info[0], "0/1000 iterations");
        assert_eq!(info.info[1], "100/2000 games played");
    }

    #[test]
    fn accepted_gainer_is_green() {
        let mut run = fixtures::sprt_run(4);
        let sprt = run.args.sprt_mut().unwrap();
        sprt.llr = 2.95;
        sprt.state = Status::Accepted;
        let info = format_results(&results(300, 200, 500), &run);
        assert_eq!(info.style, Some(Color::Green));
        assert!(info.info[0].starts_with("LLR: 2.95"));
    }

    #[test]
    fn accepted_simplification_is_blue() {
        let sprt = Sprt::new(0.05, 0.05, -1.75, 0.25, EloModel::Logistic, 4);
        let mut run = fixtures::run(StopRule::Sprt(sprt), 400);
        run.args.sprt_mut().unwrap().state = Status::Accepted;
        let info = format_results(&results(300, 300, 400), &run);
        assert_eq!(info.style, Some(Color::Blue));
    }

    #[test]
    fn rejection_softens_to_yellow_when_ahead() {
        let mut run = fixtures::sprt_run(4);
        run.args.sprt_mut().unwrap().state = Status::Rejected;
        let info = format_results(&results(300, 200, 500), &run);
        assert_eq!(info.style, Some(Color::Yellow));
        let info = format_results(&results(200, 300, 500), &run);
        assert_eq!(info.style, Some(Color::Red));
    }

    #[test]
    fn fixed_games_call_it_on_los() {
        let run = fixtures::run(StopRule::Games, 400);
        // 50 wins vs 30 losses: los ~ 0.989, accepted
        let info = format_results(&results(50, 30, 40), &run);
        assert_eq!(info.style, Some(Color::Green));
        assert!(info.info[0].starts_with("ELO: 58.45"));
        let info = format_results(&results(30, 50, 40), &run);
        assert_eq!(info.style, Some(Color::Red));
    }

    #[test]
    fn totals_and_pentanomial_lines() {
        let run = fixtures::run(StopRule::Games, 400);
        let mut r = results(50, 30, 40);
        r.pentanomial = Some([5, 10, 20, 15, 10]);
        let info = format_results(&r, &run);
        assert!(info.info.contains(&"Total: 120 W: 50 L: 30 D: 40".to_string()));
        assert!(info.info.contains(&"Ptnml(0-2): 5, 10, 20, 15, 10".to_string()));
    }
}
