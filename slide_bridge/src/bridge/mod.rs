//! One bridge node per configured slide: connection lifecycle, state
//! mirroring and remote command handling.

use std::{sync::Arc, time::Duration};

use tracing::{info, instrument, warn};

use crate::model::{AddressSpace, ModelError, NamespaceIndex, VariableHandle, Variant};

pub mod axis;
pub mod gateway;
pub mod mirror;
pub mod supervisor;

use axis::AxisFactory;
use gateway::{CommandStatus, STATUS_OK, SlideCommand, SlideMethod};
use mirror::StateMirror;
use supervisor::ConnectionSupervisor;

pub const POSITION_VARIABLE: &str = "position [mm]";
pub const BUSY_VARIABLE: &str = "busy";
pub const STATUS_VARIABLE: &str = "status";
pub const INITIAL_STATUS: &str = "No connection";

/// What a published method is bound to: the node at `node` in the server
/// loop, and the method to run on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodBinding {
    pub node: usize,
    pub method: SlideMethod,
}

pub struct BridgeNode {
    name: String,
    status_handle: VariableHandle,
    last_status: String,
    mirror: StateMirror,
    supervisor: ConnectionSupervisor,
}

impl BridgeNode {
    /// Registers the slide object with its variables and methods. `index` is
    /// the node's position in the server loop and ends up in every
    /// [`MethodBinding`].
    pub fn new(
        space: &mut dyn AddressSpace,
        ns: NamespaceIndex,
        index: usize,
        name: &str,
        factory: Arc<dyn AxisFactory>,
        cooldown: Duration,
    ) -> Result<Self, ModelError> {
        let object = space.add_object(ns, name)?;
        let position_handle = space.add_variable(object, POSITION_VARIABLE, Variant::Double(0.0))?;
        let busy_handle = space.add_variable(object, BUSY_VARIABLE, Variant::Boolean(false))?;
        let status_handle = space.add_variable(
            object,
            STATUS_VARIABLE,
            Variant::String(INITIAL_STATUS.to_string()),
        )?;

        for method in SlideMethod::ALL {
            space.add_method(
                object,
                method.decl(),
                MethodBinding {
                    node: index,
                    method,
                },
            )?;
        }

        Ok(Self {
            name: name.to_string(),
            status_handle,
            last_status: INITIAL_STATUS.to_string(),
            mirror: StateMirror::new(busy_handle, position_handle),
            supervisor: ConnectionSupervisor::new(factory, cooldown),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> &str {
        &self.last_status
    }

    pub fn is_connected(&self) -> bool {
        self.supervisor.is_connected()
    }

    fn set_status(&mut self, space: &mut dyn AddressSpace, status: &str) {
        if self.last_status == status {
            return;
        }

        match space.publish(self.status_handle, Variant::String(status.to_string())) {
            Ok(()) => self.last_status = status.to_string(),
            Err(e) => warn!("{}: failed to publish status: {}", self.name, e),
        }
    }

    /// One refresh period. Without a handle this only drives
    /// initialization, with one it samples and mirrors.
    pub async fn tick(&mut self, space: &mut dyn AddressSpace) {
        if !self.supervisor.is_connected() {
            match self.supervisor.ensure().await {
                Some(Ok(())) => {
                    info!("{} initialized", self.name);
                    self.set_status(space, STATUS_OK);
                }
                Some(Err(e)) => {
                    warn!("{} initialization failed: {}", self.name, e);
                    self.set_status(space, &e.to_string());
                }
                None => {}
            }
            return;
        }

        match self.supervisor.sample().await {
            Ok((busy, position)) => {
                self.set_status(space, STATUS_OK);
                self.mirror.update(space, busy, position);
            }
            Err(e) => self.set_status(space, &e.to_string()),
        }
    }

    /// Entry point for a resolved remote call.
    pub async fn call(&mut self, method: SlideMethod, args: &[Variant]) -> CommandStatus {
        match method.command(args) {
            Ok(command) => self.invoke(command).await,
            Err(message) => CommandStatus::bad(message),
        }
    }

    #[cfg(test)]
    pub(crate) async fn settle(&self) {
        self.supervisor.settle().await;
    }

    #[instrument(level = "debug", skip(self), fields(slide = %self.name))]
    pub async fn invoke(&mut self, command: SlideCommand) -> CommandStatus {
        gateway::execute(self.supervisor.handle(), command).await
    }
}


#[cfg(test)]
mod tests {
    use tokio::time::advance;

    use super::*;
    use crate::{
        bridge::{
            axis::{AxisError, TransportKind},
            supervisor::DEFAULT_COOLDOWN,
            testing::{AxisCall, FakeFactory},
        },
        model::server::ModelServer,
    };

    const SLIDE: &str = "Cross Slide";

    fn node(factory: &Arc<FakeFactory>) -> (ModelServer, BridgeNode) {
        let mut space = ModelServer::new(64);
        let ns = space.register_namespace("zaber-opcua");
        let node = BridgeNode::new(&mut space, ns, 0, SLIDE, factory.clone(), DEFAULT_COOLDOWN)
            .unwrap();
        (space, node)
    }

    fn read(space: &ModelServer, variable: &str) -> Variant {
        space.read(SLIDE, variable).unwrap()
    }

    /// Two ticks: one starts initialization, the next collects it.
    async fn connect(space: &mut ModelServer, node: &mut BridgeNode) {
        node.tick(space).await;
        node.settle().await;
        node.tick(space).await;
    }

    #[tokio::test]
    async fn registers_variables_and_methods() {
        let (space, node) = node(&FakeFactory::working());

        assert_eq!(read(&space, POSITION_VARIABLE), Variant::Double(0.0));
        assert_eq!(read(&space, BUSY_VARIABLE), Variant::Boolean(false));
        assert_eq!(
            read(&space, STATUS_VARIABLE),
            Variant::String(INITIAL_STATUS.to_string())
        );
        assert_eq!(node.name(), SLIDE);

        let (binding, args) = space.resolve_call(SLIDE, "move_max", &[]).unwrap();
        assert_eq!(
            binding,
            MethodBinding {
                node: 0,
                method: SlideMethod::MoveMax
            }
        );
        assert_eq!(args, vec![Variant::Double(0.0), Variant::Double(0.0)]);
    }

    #[tokio::test]
    async fn successful_init_publishes_ok_without_sampling() {
        let factory = FakeFactory::working();
        let (mut space, mut node) = node(&factory);

        connect(&mut space, &mut node).await;

        assert!(node.is_connected());
        assert_eq!(read(&space, STATUS_VARIABLE), Variant::String("Ok".to_string()));
        assert!(factory.axis().calls().is_empty());
    }

    #[tokio::test]
    async fn failed_init_publishes_reason() {
        let factory = FakeFactory::failing("No Zaber devices answered");
        let (mut space, mut node) = node(&factory);

        connect(&mut space, &mut node).await;

        assert!(!node.is_connected());
        assert_eq!(
            read(&space, STATUS_VARIABLE),
            Variant::String("No Zaber devices answered".to_string())
        );
    }

    #[tokio::test]
    async fn identical_samples_publish_once() {
        let factory = FakeFactory::working();
        factory.axis().set_position(12.5);
        let (mut space, mut node) = node(&factory);
        connect(&mut space, &mut node).await;
        let mut changes = space.subscribe();

        node.tick(&mut space).await;
        node.tick(&mut space).await;
        node.tick(&mut space).await;

        let mut seen = Vec::new();
        while let Ok(change) = changes.try_recv() {
            seen.push(change.variable);
        }
        assert_eq!(seen, vec![BUSY_VARIABLE, POSITION_VARIABLE]);
        assert_eq!(read(&space, POSITION_VARIABLE), Variant::Double(12.5));
        assert_eq!(factory.axis().calls().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_fault_stops_sampling() {
        let factory = FakeFactory::working();
        let (mut space, mut node) = node(&factory);
        connect(&mut space, &mut node).await;
        node.tick(&mut space).await;

        factory.axis().fail_sampling(AxisError::transport(
            TransportKind::Timeout,
            "Device did not respond in time",
        ));
        node.tick(&mut space).await;

        assert!(!node.is_connected());
        assert_eq!(
            read(&space, STATUS_VARIABLE),
            Variant::String("Device did not respond in time".to_string())
        );

        factory.axis().clear_calls();
        node.tick(&mut space).await;
        node.tick(&mut space).await;
        assert!(factory.axis().calls().is_empty());
        assert_eq!(factory.attempts(), 1);

        // Reconnects after the cooldown.
        factory.axis().recover_sampling();
        advance(DEFAULT_COOLDOWN).await;
        connect(&mut space, &mut node).await;
        assert!(node.is_connected());
        assert_eq!(factory.attempts(), 2);
        assert_eq!(read(&space, STATUS_VARIABLE), Variant::String("Ok".to_string()));
    }

    #[tokio::test]
    async fn position_fault_after_busy_read_skips_the_mirror() {
        let factory = FakeFactory::working();
        let (mut space, mut node) = node(&factory);
        connect(&mut space, &mut node).await;
        node.tick(&mut space).await;

        factory.axis().set_busy(true);
        factory.axis().set_position(7.5);
        factory.axis().fail_position(AxisError::transport(
            TransportKind::ConnectionClosed,
            "Connection closed: broken pipe",
        ));
        factory.axis().clear_calls();
        let mut changes = space.subscribe();
        node.tick(&mut space).await;

        assert_eq!(
            factory.axis().calls(),
            vec![AxisCall::IsBusy, AxisCall::GetPosition]
        );
        assert!(!node.is_connected());
        let mut seen = Vec::new();
        while let Ok(change) = changes.try_recv() {
            seen.push(change.variable);
        }
        assert_eq!(seen, vec![STATUS_VARIABLE]);
        assert_eq!(read(&space, BUSY_VARIABLE), Variant::Boolean(false));
        assert_eq!(read(&space, POSITION_VARIABLE), Variant::Double(0.0));
        assert_eq!(
            read(&space, STATUS_VARIABLE),
            Variant::String("Connection closed: broken pipe".to_string())
        );
    }

    #[tokio::test]
    async fn clean_sample_clears_fault_status() {
        let factory = FakeFactory::working();
        let (mut space, mut node) = node(&factory);
        connect(&mut space, &mut node).await;

        factory
            .axis()
            .fail_sampling(AxisError::Command("Command rejected: BADDATA".to_string()));
        node.tick(&mut space).await;
        assert!(node.is_connected());
        assert_eq!(node.status(), "Command rejected: BADDATA");

        factory.axis().recover_sampling();
        node.tick(&mut space).await;
        assert_eq!(node.status(), "Ok");
        assert_eq!(read(&space, STATUS_VARIABLE), Variant::String("Ok".to_string()));
    }

    #[tokio::test]
    async fn command_on_absent_handle() {
        let factory = FakeFactory::failing("No devices found");
        let (_space, mut node) = node(&factory);

        let status = node
            .call(
                SlideMethod::MoveAbsolute,
                &[
                    Variant::Double(10.0),
                    Variant::Double(0.0),
                    Variant::Double(0.0),
                ],
            )
            .await;

        assert_eq!(status, CommandStatus::bad("Axis not initialized!"));
        assert!(factory.axis().calls().is_empty());
    }

    #[tokio::test]
    async fn command_on_present_handle() {
        let factory = FakeFactory::working();
        let (mut space, mut node) = node(&factory);
        connect(&mut space, &mut node).await;

        let status = node
            .call(
                SlideMethod::MoveAbsolute,
                &[
                    Variant::Double(10.0),
                    Variant::Double(5.0),
                    Variant::Double(100.0),
                ],
            )
            .await;

        assert_eq!(status, CommandStatus::ok());
        assert_eq!(
            factory.axis().calls(),
            vec![AxisCall::Stop, AxisCall::MoveAbsolute(10.0, 5.0, 100.0)]
        );
    }

    #[tokio::test]
    async fn bad_arguments_make_no_device_call() {
        let factory = FakeFactory::working();
        let (mut space, mut node) = node(&factory);
        connect(&mut space, &mut node).await;

        let status = node
            .call(
                SlideMethod::MoveVelocity,
                &[Variant::Double(f64::INFINITY), Variant::Double(0.0)],
            )
            .await;

        assert!(!status.good);
        assert!(factory.axis().calls().is_empty());
    }
}
