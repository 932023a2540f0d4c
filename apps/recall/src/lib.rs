use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use recall_config::Config;
use recall_domain::memory::MemorySource;
use recall_service::{
	ChatRequest, CompletionContextRequest, CreateConversationRequest, ImportMemoryRequest,
	ProactiveRequest, RecallService, RetrieveRequest,
};
use recall_storage::{db::Db, qdrant::QdrantStore};

#[derive(Debug, Parser)]
#[command(
	version = recall_cli::VERSION,
	rename_all = "kebab",
	styles = recall_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE", global = true, default_value = "recall.toml")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Create the document tables and the vector collection.
	Init,
	/// Embed and store one memory.
	Import {
		#[arg(long, short = 'o')]
		owner: String,
		#[arg(long)]
		content: String,
		#[arg(long, value_parser = parse_source)]
		source: Option<MemorySource>,
		#[arg(long, value_parser = recall_cli::json_object)]
		metadata: Option<Value>,
	},
	/// Rank an owner's memories against a query.
	Search {
		#[arg(long, short = 'o')]
		owner: String,
		#[arg(long, short = 'q')]
		query: String,
		#[arg(long, value_name = "N")]
		limit: Option<i64>,
		#[arg(long)]
		threshold: Option<f32>,
		#[arg(long, value_name = "MS")]
		timeout_ms: Option<u64>,
	},
	/// Evaluate a proactive trigger.
	Evaluate {
		#[arg(long, short = 'o')]
		owner: String,
		#[arg(long, short = 't')]
		trigger: String,
		#[arg(long)]
		context: String,
	},
	/// Print the completion window for a conversation.
	Context {
		#[arg(long, short = 'o')]
		owner: String,
		#[arg(long, value_name = "UUID")]
		conversation: Uuid,
		#[arg(long, short = 'q')]
		query: Option<String>,
		#[arg(long, value_name = "N")]
		max_messages: Option<i64>,
	},
	/// Send one chat turn, creating a conversation when none is given.
	Chat {
		#[arg(long, short = 'o')]
		owner: String,
		#[arg(long, value_name = "UUID")]
		conversation: Option<Uuid>,
		#[arg(long, short = 'm')]
		message: String,
	},
	/// Re-upsert every stored vector into the index.
	RebuildIndex,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = recall_config::load(&args.config)?;

	init_tracing(&config);

	let db = Arc::new(Db::connect(&config.storage.postgres).await?);
	let qdrant = Arc::new(QdrantStore::new(&config.storage.qdrant)?);
	let result = dispatch(args.command, config, db.clone(), qdrant).await;

	db.close().await;

	result
}

async fn dispatch(
	command: Command,
	config: Config,
	db: Arc<Db>,
	qdrant: Arc<QdrantStore>,
) -> color_eyre::Result<()> {
	if let Command::Init = command {
		recall_service::admin::bootstrap(&db, &qdrant).await?;

		tracing::info!(collection = %qdrant.collection, "Storage initialized.");

		return Ok(());
	}

	let service = RecallService::new(config, db, qdrant);

	match command {
		Command::Init => Ok(()),
		Command::Import { owner, content, source, metadata } => {
			let memory_id = service
				.import_memory(ImportMemoryRequest { owner_id: owner, content, source, metadata })
				.await?;

			print_json(&serde_json::json!({ "memory_id": memory_id }))
		},
		Command::Search { owner, query, limit, threshold, timeout_ms } => {
			let ranked = service
				.retrieve(RetrieveRequest { owner_id: owner, query, limit, threshold, timeout_ms })
				.await?;

			print_json(&ranked)
		},
		Command::Evaluate { owner, trigger, context } => {
			let response = service
				.evaluate_trigger(ProactiveRequest { owner_id: owner, trigger, context })
				.await?;

			print_json(&response)
		},
		Command::Context { owner, conversation, query, max_messages } => {
			let context = service
				.assemble_completion_request(CompletionContextRequest {
					owner_id: owner,
					conversation_id: conversation,
					query,
					max_messages,
					memory_limit: None,
					threshold: None,
				})
				.await?;

			print_json(&context)
		},
		Command::Chat { owner, conversation, message } => {
			let conversation_id = match conversation {
				Some(id) => id,
				None =>
					service
						.create_conversation(CreateConversationRequest {
							owner_id: owner.clone(),
							title: None,
						})
						.await?
						.conversation_id,
			};
			let response =
				service.chat(ChatRequest { owner_id: owner, conversation_id, message }).await?;

			print_json(&serde_json::json!({ "conversation_id": conversation_id, "turn": response }))
		},
		Command::RebuildIndex => {
			let report = service.rebuild_index().await?;

			print_json(&report)
		},
	}
}

fn init_tracing(config: &Config) {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn print_json<T>(value: &T) -> color_eyre::Result<()>
where
	T: ?Sized + Serialize,
{
	let json = serde_json::to_string_pretty(value)?;

	println!("{json}");

	Ok(())
}

fn parse_source(raw: &str) -> Result<MemorySource, String> {
	raw.parse::<MemorySource>().map_err(|code| code.describe().to_string())
}
