//! The action run: configuration in, credentials out.
//!
//! [`Action::run`] walks a strictly linear flow. Every step either succeeds
//! or ends the run with an [`ActionError`]; nothing is published until all
//! remote work has finished, so a failed run never leaves half an export
//! behind.

use crate::assume::{self, RoleAssumer};
use crate::config::ActionInputs;
use crate::credentials::{self, CredentialOrigin, CredentialSet, ResolvedCredentials};
use crate::export::{vars, ExportRecord};
use crate::factory::ServiceFactory;
use crate::runner::{ExportSink, InputSource};
use crate::sts::{AssumptionRequest, CallerIdentity};
use crate::tags::JobMetadata;
use crate::token::{self, TokenSource};
use crate::validation::validate_region;
use crate::{ActionError, Result};
use aws_smithy_async::rt::sleep::{SharedAsyncSleep, TokioSleep};
use tracing::{debug, info, warn};

/// Environment switch for printing the full error chain on failure.
pub const SHOW_STACK_TRACE: &str = "SHOW_STACK_TRACE";

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Where the base credentials came from; `None` for pure token flows
    pub origin: Option<CredentialOrigin>,

    /// Role that was assumed, fully qualified
    pub role_arn: Option<String>,

    /// Final account id (role account when a role was assumed)
    pub account_id: Option<String>,
}

/// Everything the flow produced before exporting.
struct Plan {
    base: Option<ResolvedCredentials>,
    base_caller: Option<CallerIdentity>,
    role: Option<AssumedRole>,
}

struct AssumedRole {
    arn: String,
    credentials: CredentialSet,
    caller: CallerIdentity,
}

/// One action invocation.
///
/// # Example
///
/// ```no_run
/// use aws_creds_action::action::Action;
/// use aws_creds_action::factory;
/// use aws_creds_action::providers::{self, github::GithubRunner};
///
/// #[tokio::main]
/// async fn main() -> aws_creds_action::Result<()> {
///     providers::register_all();
///     let runner = GithubRunner::from_env();
///     let services = factory::new_services("aws")?;
///
///     let ok = Action::new(&runner, &runner, services.as_ref())
///         .run_and_report()
///         .await;
///     std::process::exit(if ok { 0 } else { 1 });
/// }
/// ```
pub struct Action<'a> {
    source: &'a dyn InputSource,
    sink: &'a dyn ExportSink,
    services: &'a dyn ServiceFactory,
    sleep: SharedAsyncSleep,
}

impl<'a> Action<'a> {
    pub fn new(
        source: &'a dyn InputSource,
        sink: &'a dyn ExportSink,
        services: &'a dyn ServiceFactory,
    ) -> Self {
        Self {
            source,
            sink,
            services,
            sleep: SharedAsyncSleep::new(TokioSleep::new()),
        }
    }

    /// Replaces the wait used between assumption attempts.
    pub fn with_sleep(mut self, sleep: SharedAsyncSleep) -> Self {
        self.sleep = sleep;
        self
    }

    /// Runs the flow and exports the result.
    ///
    /// # Errors
    ///
    /// Any failing step ends the run; see [`ActionError`] for the taxonomy.
    /// Nothing has been exported when an error is returned from a step
    /// before export.
    pub async fn run(&self) -> Result<Outcome> {
        let inputs = ActionInputs::from_source(self.source)?;
        debug!(?inputs, "Action inputs");

        let metadata = match inputs.role_to_assume {
            Some(_) => Some(JobMetadata::from_source(self.source)?),
            None => None,
        };

        credentials::from_action_inputs(&inputs)?;
        let region = validate_region(&inputs.region)?;
        let token_source = token::select(&inputs, self.source);

        let plan = self
            .plan(&inputs, region, token_source, metadata.as_ref())
            .await?;

        self.export(&inputs, region, plan)
    }

    /// Runs the flow and reports any failure to the sink.
    ///
    /// Returns true on success.
    pub async fn run_and_report(&self) -> bool {
        match self.run().await {
            Ok(outcome) => {
                info!(
                    account_id_known = outcome.account_id.is_some(),
                    assumed = outcome.role_arn.is_some(),
                    "Credentials configured"
                );
                true
            }
            Err(err) => {
                if err.is_unexpected() {
                    warn!("Internal inconsistency while loading credentials");
                }
                self.sink.set_failed(&err.to_string());
                if self.source.env(SHOW_STACK_TRACE).as_deref() == Some("true") {
                    self.sink.error_detail(&err.detail());
                }
                false
            }
        }
    }

    async fn plan(
        &self,
        inputs: &ActionInputs,
        region: &str,
        token_source: Option<TokenSource>,
        metadata: Option<&JobMetadata>,
    ) -> Result<Plan> {
        let sts = self.services.sts(region)?;
        let needs_base = inputs.role_to_assume.is_none()
            || token_source.is_none()
            || inputs.access_key_id.is_some();

        let (base, base_caller) = if needs_base {
            let loader = self.services.credential_loader(region)?;
            let resolved = credentials::resolve(inputs, loader.as_ref()).await?;
            let caller = sts.get_caller_identity(&resolved.credentials).await?;
            debug!("Base account id resolved");
            (Some(resolved), Some(caller))
        } else {
            debug!("Token based assumption without base credentials");
            (None, None)
        };

        let Some(ref role) = inputs.role_to_assume else {
            return Ok(Plan {
                base,
                base_caller,
                role: None,
            });
        };

        let role_arn = assume::qualify_role_arn(role, base_caller.as_ref())?;
        let request = self
            .request(inputs, role_arn, token_source, base.as_ref(), metadata)
            .await?;

        let credentials = RoleAssumer::new(sts.as_ref(), self.sleep.clone())
            .assume(&request)
            .await?;
        let caller = sts.get_caller_identity(&credentials).await?;

        Ok(Plan {
            base,
            base_caller,
            role: Some(AssumedRole {
                arn: request.role_arn().to_string(),
                credentials,
                caller,
            }),
        })
    }

    async fn request(
        &self,
        inputs: &ActionInputs,
        role_arn: String,
        token_source: Option<TokenSource>,
        base: Option<&ResolvedCredentials>,
        metadata: Option<&JobMetadata>,
    ) -> Result<AssumptionRequest> {
        match token_source {
            Some(TokenSource::File(path)) => {
                let identity_token = token::read_token_file(&path).await?;
                Ok(AssumptionRequest::WebIdentity(assume::token_request(
                    inputs,
                    role_arn,
                    identity_token,
                )))
            }
            Some(TokenSource::Oidc {
                request_url,
                request_token,
            }) => {
                let issuer = self.services.token_issuer(&request_url, &request_token)?;
                let identity_token = token::fetch_oidc_token(issuer.as_ref()).await?;
                Ok(AssumptionRequest::WebIdentity(assume::token_request(
                    inputs,
                    role_arn,
                    identity_token,
                )))
            }
            None => {
                let base = base.ok_or_else(|| {
                    ActionError::CredentialsUnavailable(
                        "Could not load credentials from any providers".to_string(),
                    )
                })?;
                Ok(AssumptionRequest::Credentials(assume::credential_request(
                    inputs,
                    role_arn,
                    &base.credentials,
                    metadata,
                )))
            }
        }
    }

    fn export(&self, inputs: &ActionInputs, region: &str, plan: Plan) -> Result<Outcome> {
        let stale_token = self.source.env(vars::SESSION_TOKEN).is_some();
        let static_credentials = plan
            .base
            .as_ref()
            .filter(|resolved| resolved.origin == CredentialOrigin::ActionInputs)
            .map(|resolved| &resolved.credentials);
        let base_account = plan
            .base_caller
            .as_ref()
            .map(|caller| caller.account.as_str());

        ExportRecord::base(
            region,
            static_credentials,
            base_account,
            stale_token,
            inputs.mask_aws_account_id,
        )
        .apply(self.sink)?;

        let mut outcome = Outcome {
            origin: plan.base.as_ref().map(|resolved| resolved.origin),
            role_arn: None,
            account_id: plan.base_caller.map(|caller| caller.account),
        };

        if let Some(role) = plan.role {
            ExportRecord::role(
                &role.credentials,
                &role.caller.account,
                inputs.mask_aws_account_id,
            )
            .apply(self.sink)?;

            outcome.role_arn = Some(role.arn);
            outcome.account_id = Some(role.caller.account);
        }

        Ok(outcome)
    }
}
