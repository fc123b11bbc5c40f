use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::fs;

use crate::ai::chat::{Chat, ChatBuilder, Conversation, ConversationId, SessionStore};
use crate::core::AppConfig;
use crate::core::db::{KeyValueStore, SqliteKv};
use crate::openai::{CompletionClient, CompletionError, Role};

const TERMS_NOTICE: &str = "Replies are generated by a language model and can be wrong or \
incomplete. Conversations are stored on this machine and sent to the configured completion \
endpoint.";

const HELP: &str = "Commands:
  /new               start a new conversation
  /list              list conversations, * marks the active one
  /switch <n|id>     make another conversation active
  /delete <n|id>     delete a conversation
  /clear             remove all messages from the active conversation
  /help              show this help
  /exit              quit
Press Ctrl-C while waiting on a reply to cancel it.";

#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    New,
    List,
    Switch(String),
    Delete(String),
    Clear,
    Help,
    Exit,
    Unknown(String),
}

impl ReplCommand {
    /// Parse the text after the leading `/`
    fn parse(input: &str) -> Self {
        let mut parts = input.trim().splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::trim).unwrap_or_default().to_string();

        match (name, arg.is_empty()) {
            ("new", _) => Self::New,
            ("list", _) => Self::List,
            ("switch", false) => Self::Switch(arg),
            ("delete", false) => Self::Delete(arg),
            ("clear", _) => Self::Clear,
            ("help", _) => Self::Help,
            ("exit" | "quit", _) => Self::Exit,
            _ => Self::Unknown(input.trim().to_string()),
        }
    }
}

/// Find the conversation a user means by `target`: either its
/// 1-based position in the list or its id.
fn resolve_target<S: KeyValueStore>(
    store: &SessionStore<S>,
    target: &str,
) -> Option<ConversationId> {
    let conversations = &store.state().conversations;
    if let Ok(n) = target.parse::<usize>() {
        return n
            .checked_sub(1)
            .and_then(|idx| conversations.get(idx))
            .map(|c| c.id.clone());
    }

    let id = ConversationId::from(target);
    store.conversation(&id).map(|_| id)
}

fn print_transcript(convo: &Conversation) {
    println!("--- {} ---", convo.title);
    for msg in convo.messages.iter() {
        match msg.role {
            Role::User => println!(">>> {}", msg.content),
            _ => println!("{}\n", msg.content),
        }
    }
}

fn print_list<S: KeyValueStore>(store: &SessionStore<S>) {
    let summaries = store.list_conversations();
    if summaries.is_empty() {
        println!("No conversations yet");
        return;
    }
    let active_id = store.active_id();
    for (idx, summary) in summaries.iter().enumerate() {
        let marker = if Some(&summary.id) == active_id { "*" } else { " " };
        println!("{} {:>3}. {}", marker, idx + 1, summary.title);
    }
}

/// Returns false when the REPL should exit
fn handle_command<S: KeyValueStore>(chat: &mut Chat<S>, command: ReplCommand) -> bool {
    let store = chat.store_mut();
    match command {
        ReplCommand::New => {
            store.create_conversation();
            println!("Started a new conversation");
        }
        ReplCommand::List => print_list(store),
        ReplCommand::Switch(target) => match resolve_target(store, &target) {
            Some(id) => {
                store.switch_active(&id);
                if let Some(convo) = store.active_conversation() {
                    print_transcript(convo);
                }
            }
            None => println!("No conversation matches {}", target),
        },
        ReplCommand::Delete(target) => match resolve_target(store, &target) {
            Some(id) => {
                store.delete_conversation(&id);
                println!("Deleted conversation {}", id);
            }
            None => println!("No conversation matches {}", target),
        },
        ReplCommand::Clear => {
            if let Some(id) = store.active_id().cloned() {
                store.append_messages(&id, Vec::new());
                println!("Cleared the active conversation");
            }
        }
        ReplCommand::Help => println!("{}", HELP),
        ReplCommand::Exit => return false,
        ReplCommand::Unknown(cmd) => println!("Unknown command /{}, try /help", cmd),
    }
    true
}

async fn send<S: KeyValueStore>(chat: &mut Chat<S>, client: &CompletionClient, input: &str) {
    let turn = match chat.begin_turn(input) {
        Ok(turn) => turn,
        Err(e) => {
            println!("{}", e);
            return;
        }
    };

    let cancel = turn.cancel_token();
    let result = tokio::select! {
        result = client.complete(turn.request(), &cancel) => result,
        _ = tokio::signal::ctrl_c() => {
            chat.cancel();
            Err(CompletionError::Cancelled)
        }
    };

    let reply = chat.finish_turn(turn, result);
    println!("{}\n", reply.content);
}

pub async fn run(config: AppConfig) -> Result<()> {
    fs::create_dir_all(&config.storage_path)?;
    let kv = SqliteKv::open(&config.db_path)?;
    let store = SessionStore::open(kv, config.create_debounce);
    let mut chat = ChatBuilder::new(store)
        .system_message(&config.system_message)
        .build();
    let client = CompletionClient::from_config(&config);

    let mut rl = DefaultEditor::new()?;

    if !chat.store().persistence().terms_accepted() {
        println!("{}", TERMS_NOTICE);
        let accepted = match rl.readline("Accept? [y/N] ") {
            Ok(answer) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        };
        if !accepted {
            println!("Terms not accepted, exiting");
            return Ok(());
        }
        chat.store_mut().persistence_mut().set_terms_accepted(true)?;
    }

    if let Some(convo) = chat.store().active_conversation() {
        print_transcript(convo);
    }
    println!("Using model {}. Type /help for commands.", client.model());

    loop {
        let readline = rl.readline(">>> ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if let Some(cmd) = line.strip_prefix('/') {
                    if !handle_command(&mut chat, ReplCommand::parse(cmd)) {
                        break;
                    }
                    continue;
                }

                send(&mut chat, &client, line).await;
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}
