// SPDX-License-Identifier: MIT OR Apache-2.0
//! Execution backends (§4.9): `Target` is the seam the scheduler drives,
//! implemented by the Local shell/container adapter and the Kubernetes Job
//! adapter, plus cloud credential exchange for tasks carrying a
//! `credential_binding`.

mod credential;
mod error;
mod k8s;
mod local;
mod target;

pub use credential::{
    ci_oidc_token, write_credential_file, AwsExchanger, AzureExchanger, CredentialExchanger,
    ExchangedCredential, GcpExchanger,
};
pub use error::TargetError;
pub use k8s::K8sTarget;
pub use local::LocalTarget;
pub use target::{PrepareContext, RunOptions, Target, TaskOutcome};
