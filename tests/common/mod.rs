//! Shared helpers for integration tests.
//!
//! Each integration test file compiles common/ as its own module, so not
//! every helper is used in every file.
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;

use chassis::{
    Arguments, CommandHandler, CommandNode, CommandProcessor, CredentialManager, HandlerContext,
    HandlerFailure, HandlerRegistry, InvokeParams, MemoryCredentialBackend, MemoryProfileStore,
    OptionSpec, ProfileManagerFactory, ResponseSnapshot, Stream, ValueType,
};

/// Handler behind the `greet` command: requires `--name`, writes
/// `hello <name>` to stdout and sets `{greeted: <name>}` as data.
pub struct GreetHandler;

#[async_trait]
impl CommandHandler for GreetHandler {
    async fn process(&self, ctx: &mut HandlerContext<'_>) -> Result<(), HandlerFailure> {
        let name = ctx
            .arguments
            .get_str("name")
            .ok_or_else(|| HandlerFailure::imperative("--name was not bound"))?
            .to_string();
        ctx.response.log(Stream::Stdout, format!("hello {name}"));
        ctx.response
            .set_data(serde_json::json!({ "greeted": name }));
        Ok(())
    }
}

/// First chain step: emits `{token: "T"}` as data and a line of output.
pub struct EmitTokenHandler;

#[async_trait]
impl CommandHandler for EmitTokenHandler {
    async fn process(&self, ctx: &mut HandlerContext<'_>) -> Result<(), HandlerFailure> {
        ctx.response.log(Stream::Stdout, "step one\n");
        ctx.response.set_data(serde_json::json!({ "token": "T" }));
        Ok(())
    }
}

/// Second chain step: reads the linked `auth` argument and echoes it.
pub struct UseTokenHandler;

#[async_trait]
impl CommandHandler for UseTokenHandler {
    async fn process(&self, ctx: &mut HandlerContext<'_>) -> Result<(), HandlerFailure> {
        let auth = ctx.arguments.get_str("auth").unwrap_or("absent").to_string();
        ctx.response
            .log(Stream::Stdout, format!("step two auth={auth}\n"));
        ctx.response.set_data(serde_json::json!({ "auth": auth }));
        Ok(())
    }
}

/// The failure shape a [`FailingHandler`] produces.
#[derive(Clone, Copy)]
pub enum FailureMode {
    Imperative,
    Unhandled,
    Message,
    Silent,
    Value,
    Panic,
}

/// Handler that fails with a configurable shape.
pub struct FailingHandler(pub FailureMode);

#[async_trait]
impl CommandHandler for FailingHandler {
    async fn process(&self, _ctx: &mut HandlerContext<'_>) -> Result<(), HandlerFailure> {
        match self.0 {
            FailureMode::Imperative => Err(HandlerFailure::imperative("deploy refused")
                .with_details("target environment is frozen")),
            FailureMode::Unhandled => Err(HandlerFailure::Unhandled {
                message: "index out of bounds".into(),
                stack: Some("at handler.rs:12".into()),
            }),
            FailureMode::Message => Err(HandlerFailure::Message("just a string".into())),
            FailureMode::Silent => Err(HandlerFailure::Silent),
            FailureMode::Value => Err(HandlerFailure::Value(serde_json::json!(42))),
            FailureMode::Panic => panic!("handler blew up"),
        }
    }
}

/// Handler that cancels the invocation's own token, then succeeds. Used to
/// exercise the chain-step cancellation boundary.
pub struct CancellingHandler;

#[async_trait]
impl CommandHandler for CancellingHandler {
    async fn process(&self, ctx: &mut HandlerContext<'_>) -> Result<(), HandlerFailure> {
        ctx.response.log(Stream::Stdout, "cancelling\n");
        ctx.cancellation.cancel();
        Ok(())
    }
}

/// Handler that reports which profiles it received as data.
pub struct ProfileEchoHandler;

#[async_trait]
impl CommandHandler for ProfileEchoHandler {
    async fn process(&self, ctx: &mut HandlerContext<'_>) -> Result<(), HandlerFailure> {
        let main = ctx.profiles.get("main").map(|p| p.name.clone());
        let dep = ctx.profiles.get("dep").map(|p| p.name.clone());
        let token = ctx
            .profiles
            .get("main")
            .and_then(|p| p.field_str("token").map(str::to_string));
        ctx.response.set_data(serde_json::json!({
            "main": main,
            "dep": dep,
            "token": token,
        }));
        Ok(())
    }
}

/// A registry preloaded with every test handler.
pub fn test_registry() -> Arc<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    registry.register_instance("greet", Arc::new(GreetHandler));
    registry.register_instance("chain.emit", Arc::new(EmitTokenHandler));
    registry.register_instance("chain.use", Arc::new(UseTokenHandler));
    registry.register_instance("chain.cancel", Arc::new(CancellingHandler));
    registry.register_instance("profiles.echo", Arc::new(ProfileEchoHandler));
    registry.register_instance(
        "fail.imperative",
        Arc::new(FailingHandler(FailureMode::Imperative)),
    );
    registry.register_instance(
        "fail.unhandled",
        Arc::new(FailingHandler(FailureMode::Unhandled)),
    );
    registry.register_instance("fail.message", Arc::new(FailingHandler(FailureMode::Message)));
    registry.register_instance("fail.silent", Arc::new(FailingHandler(FailureMode::Silent)));
    registry.register_instance("fail.value", Arc::new(FailingHandler(FailureMode::Value)));
    registry.register_instance("fail.panic", Arc::new(FailingHandler(FailureMode::Panic)));
    Arc::new(registry)
}

/// The `greet` command node used across tests.
pub fn greet_node() -> CommandNode {
    CommandNode::command("greet")
        .with_description("Greet someone by name.")
        .with_option(OptionSpec::new("name", ValueType::String).required())
        .with_handler("greet")
}

/// A profile factory over empty in-memory stores.
pub fn empty_profile_factory() -> ProfileManagerFactory {
    ProfileManagerFactory::new(
        Arc::new(MemoryProfileStore::new()),
        Arc::new(CredentialManager::new(Box::new(
            MemoryCredentialBackend::new(),
        ))),
    )
}

/// Build a processor for a node with the shared test registry and an empty
/// profile store.
pub fn processor_for(node: CommandNode) -> CommandProcessor {
    let root = CommandNode::group("app").with_child(node.clone());
    CommandProcessor::new(node, root, "app", empty_profile_factory(), test_registry())
        .expect("should construct processor")
}

/// Invoke a processor silently with the given arguments.
pub async fn invoke_silent(processor: &CommandProcessor, arguments: Arguments) -> ResponseSnapshot {
    processor
        .invoke(InvokeParams::new(arguments).silent())
        .await
}
