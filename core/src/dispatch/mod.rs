//! Workflow dispatch endpoint implementation
//!
//! Verifies the caller's identity token, asks the policy whether the caller
//! may dispatch the requested workflow, and triggers it with the proxy's own
//! GitHub credential. Nothing is sent to GitHub before the policy allows the
//! request.

mod request;

pub use request::{extract_bearer_token, DispatchBody, DispatchRequest, DispatchResponse, DispatchTarget};

use crate::context::AppContext;
use crate::error::Result;
use crate::github;
use crate::oidc;
use crate::policy::{PolicyInput, PolicyTarget};

/// Handle a dispatch request
pub async fn handle(request: DispatchRequest, ctx: &AppContext) -> Result<DispatchResponse> {
    let http = ctx.http.as_ref();
    let clock = ctx.clock.as_ref();

    // 1. Authenticate the caller
    let token = extract_bearer_token(request.authorization.as_deref())?;
    let key_set = ctx.key_set().await?;
    let claims = oidc::verify(
        token,
        key_set,
        key_set.issuer(),
        &ctx.id_token_audience,
        http,
        clock,
    )
    .await?;
    let caller = claims.caller()?;
    tracing::debug!(
        caller.owner = %caller.owner,
        caller.repository = %caller.repository,
        caller.workflow = %caller.workflow,
        "identity token verified"
    );

    // 2. Parse the target
    let body = DispatchBody::parse(&request.body)?;
    let target = body.target;

    // 3. Evaluate the policy
    let input = PolicyInput {
        config: ctx.policy_config.clone(),
        target: PolicyTarget {
            owner: target.owner.clone(),
            repository: target.repo.clone(),
            git_ref: target.git_ref.clone().unwrap_or_default(),
            workflow: target.workflow.clone(),
            inputs: body.inputs.clone(),
        },
        caller: caller.into(),
    };
    ctx.policy
        .authorize(&input, ctx.policy_input_validation)
        .await?;

    // 4. Resolve the credential, then the ref if the caller omitted it
    let credential = ctx
        .credentials
        .resolve(&target.owner, &target.repo, http, clock)
        .await?;

    let git_ref = match target.git_ref {
        Some(git_ref) => git_ref,
        None => {
            let branch = github::api::get_default_branch(
                &target.owner,
                &target.repo,
                &credential,
                &ctx.gh_api_url,
                http,
            )
            .await?;
            tracing::debug!(default_branch = %branch, "resolved default branch");
            branch
        }
    };

    // 5. Dispatch
    github::api::create_workflow_dispatch(
        &target.owner,
        &target.repo,
        &target.workflow,
        &git_ref,
        body.inputs.as_ref(),
        &credential,
        &ctx.gh_api_url,
        http,
    )
    .await?;

    tracing::info!(
        target.owner = %target.owner,
        target.repository = %target.repo,
        target.workflow = %target.workflow,
        target.git_ref = %git_ref,
        caller.owner = %input.caller.owner,
        caller.repository = %input.caller.repository,
        policy = ctx.policy.name(),
        "workflow dispatch created"
    );

    Ok(DispatchResponse::created())
}
