use snafu::Snafu;

/// Top-level error type for startup and fatal conditions (spec.md §7:
/// "Fatal: kubeconfig missing at startup; root context cancelled. Exit
/// process."). Per-event and per-reconcile errors are handled inside their
/// own worker loop and never propagate this far — see each stage's
/// `internal_events` for how those are surfaced instead.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("failed to build Kubernetes client: {source}"))]
    KubeClient { source: kube::Error },

    #[snafu(display("required CRD is not queryable (is it installed?): {source}"))]
    CrdNotInstalled { source: kube::Error },

    #[snafu(display("invalid startup configuration: {message}"))]
    Startup { message: String },

    #[snafu(display("webhook listener failed to bind: {source}"))]
    WebhookBind { source: std::io::Error },
}
