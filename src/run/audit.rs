use super::*;
use crate::stats::Homogeneity;
use crate::stats::homogeneity;
use std::collections::HashMap;
use std::collections::HashSet;

/// verdict of the worker-homogeneity audit over a run's tasks
#[derive(Debug, Clone)]
pub struct Audit {
    pub chi2: Homogeneity,
    pub bad_workers: HashSet<String>,
}

/// traffic-light classification of an adjusted residual
pub fn classify(residual: f64) -> Color {
    if residual.abs() < crate::RESIDUAL_GREEN {
        Color::Green
    } else if residual.abs() < crate::RESIDUAL_YELLOW {
        Color::Yellow
    } else {
        Color::Red
    }
}

/// per-worker (wins, losses, draws) tallies over the tasks, skipping
/// workers already ruled out
fn tally(tasks: &[Task], exclude: &HashSet<String>) -> Vec<(String, [f64; 3])> {
    let mut tallies: Vec<(String, [f64; 3])> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for task in tasks {
        let Some(key) = task.key() else { continue };
        if exclude.contains(&key) {
            continue;
        }
        let Some(ref stats) = task.stats else {
            continue;
        };
        let wld = [stats.wins as f64, stats.losses as f64, stats.draws as f64];
        match index.get(&key) {
            Some(&i) => {
                for (acc, x) in tallies[i].1.iter_mut().zip(wld) {
                    *acc += x;
                }
            }
            None => {
                index.insert(key.clone(), tallies.len());
                tallies.push((key, wld));
            }
        }
    }
    tallies
}

/// Stamp every task with its residual and color, and single out at most
/// one statistically inconsistent worker. A task with more than a few
/// crashes is treated as maximally discrepant regardless of its tallies.
pub fn audit(tasks: &mut [Task]) -> Audit {
    let chi2 = homogeneity(&tally(tasks, &HashSet::new()));
    let mut worst: Option<(String, f64)> = None;
    for task in tasks.iter_mut() {
        let Some(key) = task.key() else { continue };
        task.residual = chi2.residuals.get(&key).copied().unwrap_or(0.0);
        let crashes = task.stats.as_ref().map_or(0, |s| s.crashes);
        if crashes > crate::CRASH_LIMIT {
            task.residual = crate::CRASH_RESIDUAL;
        }
        task.residual_color = Some(classify(task.residual));
        if chi2.suspicious() || task.residual > crate::CHI2_BAD_RESIDUAL {
            if worst.as_ref().map_or(true, |(_, r)| task.residual > *r) {
                worst = Some((key, task.residual));
            }
        }
    }
    let bad_workers = worst.into_iter().map(|(key, _)| key).collect();
    Audit { chi2, bad_workers }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::fixtures;

    fn task_for(name: &str, wins: u64, losses: u64, draws: u64) -> Task {
        let mut task = Task::new(crate::CHUNK_SIZE);
        task.claim(fixtures::worker(name, "10.0.0.1"), 0.0);
        task.stats = Some(Stats {
            wins,
            losses,
            draws,
            ..Default::default()
        });
        task
    }

    #[test]
    fn classification_thresholds() {
        assert_eq!(classify(0.0), Color::Green);
        assert_eq!(classify(-1.9), Color::Green);
        assert_eq!(classify(2.3), Color::Yellow);
        assert_eq!(classify(3.0), Color::Red);
    }

    #[test]
    fn honest_fleet_passes() {
        let mut tasks = (0..5)
            .map(|i| task_for(&format!("w{}", i), 33, 33, 34))
            .collect::<Vec<_>>();
        let audit = audit(&mut tasks);
        assert!(audit.bad_workers.is_empty());
        assert!(tasks.iter().all(|t| t.residual_color == Some(Color::Green)));
    }

    #[test]
    fn draw_bot_is_singled_out() {
        let mut tasks = (0..9)
            .map(|i| task_for(&format!("w{}", i), 33, 33, 34))
            .collect::<Vec<_>>();
        tasks.push(task_for("outlier", 0, 0, 100));
        let audit = audit(&mut tasks);
        assert_eq!(audit.bad_workers.len(), 1);
        assert!(audit.bad_workers.contains(&tasks[9].key().unwrap()));
        assert_eq!(tasks[9].residual_color, Some(Color::Red));
        assert_eq!(tasks[0].residual_color, Some(Color::Green));
    }

    #[test]
    fn crashers_are_flagged_without_statistics() {
        let mut tasks = vec![
            task_for("a", 33, 33, 34),
            task_for("b", 34, 33, 33),
            task_for("crasher", 33, 34, 33),
        ];
        tasks[2].stats.as_mut().unwrap().crashes = 5;
        let audit = audit(&mut tasks);
        assert_eq!(tasks[2].residual, crate::CRASH_RESIDUAL);
        assert_eq!(tasks[2].residual_color, Some(Color::Red));
        assert!(audit.bad_workers.contains(&tasks[2].key().unwrap()));
    }

    #[test]
    fn multiple_tasks_of_one_worker_aggregate() {
        let mut tasks = vec![
            task_for("a", 20, 20, 20),
            task_for("a", 13, 13, 14),
            task_for("b", 33, 33, 34),
        ];
        let audit = audit(&mut tasks);
        assert_eq!(audit.chi2.residuals.len(), 2);
        assert!(audit.bad_workers.is_empty());
    }
}
