use crate::run::ResultsInfo;
use crate::run::Run;

/// Outbound announcement of finished runs. The real mail collaborator
/// lives outside this subsystem; delivery failures are logged and never
/// fail the run.
pub trait Notify: Send + Sync {
    fn finished(&self, run: &Run, info: &ResultsInfo);
}

/// default collaborator: announce to the log only
pub struct Courier;

impl Notify for Courier {
    fn finished(&self, run: &Run, info: &ResultsInfo) {
        log::info!(
            "run {} ({} vs {}) finished: {}",
            run.id,
            run.args.new_tag,
            run.args.base_tag,
            info.info.join(" | ")
        );
    }
}
