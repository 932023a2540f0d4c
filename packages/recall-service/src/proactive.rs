use serde::{Deserialize, Serialize};

use crate::{Error, RecallService, Result};
use recall_domain::trigger::{self, TriggerState};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProactiveRequest {
	pub owner_id: String,
	pub trigger: String,
	pub context: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProactiveResponse {
	pub state: TriggerState,
	pub should_respond: bool,
	pub response: Option<String>,
	pub memories: Vec<String>,
}
impl ProactiveResponse {
	fn silent() -> Self {
		Self {
			state: TriggerState::Silent,
			should_respond: false,
			response: None,
			memories: Vec::new(),
		}
	}
}

impl RecallService {
	/// Decides whether a trigger should surface memories. Only allow-listed labels retrieve;
	/// a failed retrieval still responds, just without memories or a canned reply.
	pub async fn evaluate_trigger(&self, req: ProactiveRequest) -> Result<ProactiveResponse> {
		let owner_id = crate::require_owner(&req.owner_id)?;

		if req.trigger.trim().is_empty() {
			return Err(Error::Validation { message: "trigger must be non-empty.".to_string() });
		}
		if req.context.trim().is_empty() {
			return Err(Error::Validation { message: "context must be non-empty.".to_string() });
		}

		let state = trigger::decide(&req.trigger);

		if state == TriggerState::Silent {
			tracing::debug!(%owner_id, trigger = %req.trigger, "Trigger is not allow-listed.");

			return Ok(ProactiveResponse::silent());
		}

		let retrieved = self
			.retrieve_validated(
				owner_id,
				&req.context,
				self.cfg.proactive.limit,
				self.cfg.proactive.threshold,
				self.deadlines(),
			)
			.await;

		match retrieved {
			Ok(ranked) => Ok(ProactiveResponse {
				state,
				should_respond: true,
				response: Some(trigger::template_response(
					&req.context,
					self.cfg.proactive.response_prefix_chars as usize,
				)),
				memories: ranked.into_iter().map(|r| r.memory.content).collect(),
			}),
			Err(err) => {
				tracing::warn!(
					%owner_id,
					trigger = %req.trigger,
					error = %err,
					"Proactive retrieval failed. Responding without memories."
				);

				Ok(ProactiveResponse {
					state,
					should_respond: true,
					response: None,
					memories: Vec::new(),
				})
			},
		}
	}
}
