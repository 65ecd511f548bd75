use std::{
    fmt::Display,
    io,
    sync::mpsc::{Receiver, Sender},
    thread::JoinHandle,
};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutorError {
    #[error("Device executor is not running")]
    Stopped,

    #[error("Device executor dropped the response")]
    ResponseDropped,
}

/// A request executed on the device thread against its handler.
pub trait Command: Send + 'static {
    type Response: Send + 'static;
    type Error: Send + Display + From<ExecutorError> + 'static;
    type Handler: DeviceHandler<Command = Self>;

    fn execute(self, handler: &mut Self::Handler) -> Result<Self::Response, Self::Error>;
}

pub trait DeviceHandler {
    type Command: Command<Handler = Self>;
}

type CommandResult<C> = Result<<C as Command>::Response, <C as Command>::Error>;

pub struct GenericCommand<C: Command> {
    command: C,
    response_ch: oneshot::Sender<CommandResult<C>>,
}

impl<C: Command> GenericCommand<C> {
    pub fn new(command: C, response_ch: oneshot::Sender<CommandResult<C>>) -> Self {
        Self {
            command,
            response_ch,
        }
    }

    /// Returns `false` when the caller stopped waiting for the response.
    pub fn execute(self, handler: &mut C::Handler) -> bool {
        let result = self.command.execute(handler);

        if let Err(e) = &result {
            warn!("Device command failed: {}", e);
        }

        self.response_ch.send(result).is_ok()
    }
}

/// Owns a device handler and runs the commands sent to it one at a time.
pub struct CommandExecutor<H: DeviceHandler + Send + 'static> {
    name: String,
    handler: H,
    commands_ch: Receiver<GenericCommand<H::Command>>,
    sender: Sender<GenericCommand<H::Command>>,
}

impl<H: DeviceHandler + Send> CommandExecutor<H> {
    pub fn new(name: impl Into<String>, handler: H) -> Self {
        let (sender, commands_ch) = std::sync::mpsc::channel();

        Self {
            name: name.into(),
            handler,
            commands_ch,
            sender,
        }
    }

    pub fn sender(&self) -> CommandSender<H::Command> {
        CommandSender::new(self.sender.clone())
    }

    /// Runs until every [`CommandSender`] is dropped.
    pub fn run(self) {
        let CommandExecutor {
            name,
            mut handler,
            commands_ch,
            sender,
        } = self;
        drop(sender);

        info!("Executor {} started", name);

        while let Ok(command) = commands_ch.recv() {
            if !command.execute(&mut handler) {
                debug!("Executor {}: caller dropped before the response", name);
            }
        }

        info!("Executor {} stopped, all senders are gone", name);
    }

    /// Moves the executor onto its own OS thread. Device calls block, so they
    /// stay off the async runtime.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || self.run())
    }
}

pub struct CommandSender<T: Command> {
    commands_ch: Sender<GenericCommand<T>>,
}

impl<C: Command> Clone for CommandSender<C> {
    fn clone(&self) -> Self {
        Self {
            commands_ch: self.commands_ch.clone(),
        }
    }
}

impl<C: Command> CommandSender<C> {
    pub fn new(commands_ch: Sender<GenericCommand<C>>) -> Self {
        Self { commands_ch }
    }

    pub async fn send_command(&self, command: C) -> Result<C::Response, C::Error> {
        let (response_ch, response_rx) = oneshot::channel();
        let command = GenericCommand::new(command, response_ch);

        self.commands_ch
            .send(command)
            .map_err(|_| ExecutorError::Stopped)?;

        response_rx
            .await
            .map_err(|_| ExecutorError::ResponseDropped)?
    }
}
