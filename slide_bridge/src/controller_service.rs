use std::time::Duration;

use tokio::{
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::{
    bridge::{BridgeNode, gateway::CommandStatus},
    communication::{Request, RequestEnvelope, RequestError, RequestResult, Response},
    model::{ModelError, server::ModelServer},
};

/// Owns the address space and every slide. Ticks and remote requests take
/// turns on this one task.
pub struct SlideServer {
    space: ModelServer,
    nodes: Vec<BridgeNode>,
    refresh: Duration,
}

impl SlideServer {
    pub fn new(space: ModelServer, nodes: Vec<BridgeNode>, refresh: Duration) -> Self {
        Self {
            space,
            nodes,
            refresh,
        }
    }

    pub async fn tick(&mut self) {
        for node in &mut self.nodes {
            node.tick(&mut self.space).await;
        }
    }

    pub async fn handle_request(&mut self, request: Request) -> RequestResult {
        match request {
            Request::Browse => Ok(Response::Members(self.space.browse())),
            Request::Read { object, variable } => Ok(Response::Value(
                self.space.read(&object, &variable)?,
            )),
            Request::Call {
                object,
                method,
                args,
            } => {
                let (binding, values) = match self.space.resolve_call(&object, &method, &args) {
                    Ok(resolved) => resolved,
                    Err(ModelError::BadArguments(message)) => {
                        return Ok(Response::Called(CommandStatus::bad(message)));
                    }
                    Err(e) => return Err(e.into()),
                };

                let node = self.nodes.get_mut(binding.node).ok_or_else(|| {
                    RequestError::new(format!("'{}' is not bound to a slide", object))
                })?;
                debug!("{}.{}({:?})", node.name(), method, args);

                Ok(Response::Called(node.call(binding.method, &values).await))
            }
            Request::Subscribe => Err(RequestError::new(
                "Subscriptions are served by the access layer",
            )),
        }
    }

    /// Runs until the task is dropped. Once every request sender is gone the
    /// slides keep being refreshed.
    pub async fn run(
        mut self,
        mut request_rx: mpsc::Receiver<RequestEnvelope>,
    ) -> anyhow::Result<()> {
        let mut interval = time::interval(self.refresh);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut accepting = true;

        info!(
            "Refreshing {} slide(s) every {:?}",
            self.nodes.len(),
            self.refresh
        );

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                envelope = request_rx.recv(), if accepting => match envelope {
                    Some(RequestEnvelope { request, response }) => {
                        let result = self.handle_request(request).await;
                        if response.send(result).is_err() {
                            debug!("Client left before the response");
                        }
                    }
                    None => {
                        info!("Request channel closed");
                        accepting = false;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bridge::{
            STATUS_VARIABLE,
            supervisor::DEFAULT_COOLDOWN,
            testing::{AxisCall, FakeFactory},
        },
        communication::commands::envelope,
        model::{AddressSpace, Variant},
    };

    fn server(factory: &std::sync::Arc<FakeFactory>) -> SlideServer {
        let mut space = ModelServer::new(64);
        let ns = space.register_namespace("zaber-opcua");
        let nodes = vec![
            BridgeNode::new(&mut space, ns, 0, "Parallel Slide", factory.clone(), DEFAULT_COOLDOWN)
                .unwrap(),
        ];
        SlideServer::new(space, nodes, Duration::from_millis(100))
    }

    fn call(method: &str, args: &[&str]) -> Request {
        Request::Call {
            object: "Parallel Slide".to_string(),
            method: method.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    async fn connect(server: &mut SlideServer) {
        server.tick().await;
        for node in &server.nodes {
            node.settle().await;
        }
        server.tick().await;
    }

    #[tokio::test]
    async fn call_reaches_the_bound_node() {
        let factory = FakeFactory::working();
        let mut server = server(&factory);
        connect(&mut server).await;

        let result = server
            .handle_request(call("move_absolute", &["10", "5", "100"]))
            .await;

        assert_eq!(result, Ok(Response::Called(CommandStatus::ok())));
        assert_eq!(
            factory.axis().calls(),
            vec![AxisCall::Stop, AxisCall::MoveAbsolute(10.0, 5.0, 100.0)]
        );
    }

    #[tokio::test]
    async fn defaults_fill_missing_arguments() {
        let factory = FakeFactory::working();
        let mut server = server(&factory);
        connect(&mut server).await;

        server.handle_request(call("move_max", &[])).await.unwrap();

        assert_eq!(
            factory.axis().calls(),
            vec![AxisCall::Stop, AxisCall::MoveMax(0.0, 0.0)]
        );
    }

    #[tokio::test]
    async fn bad_arguments_are_a_bad_status() {
        let factory = FakeFactory::working();
        let mut server = server(&factory);
        connect(&mut server).await;

        let result = server
            .handle_request(call("move_absolute", &["NaN"]))
            .await;

        assert!(matches!(result, Ok(Response::Called(status)) if !status.good));
        assert!(factory.axis().calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_targets_are_errors() {
        let mut server = server(&FakeFactory::working());

        assert!(server.handle_request(call("spin", &[])).await.is_err());
        assert!(server
            .handle_request(Request::Read {
                object: "Long Slide".to_string(),
                variable: "busy".to_string(),
            })
            .await
            .is_err());
        assert!(server.handle_request(Request::Subscribe).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn run_serves_requests_between_ticks() {
        let factory = FakeFactory::failing("No devices detected");
        let server = server(&factory);
        let (request_tx, request_rx) = mpsc::channel(4);
        tokio::spawn(server.run(request_rx));

        time::sleep(Duration::from_millis(350)).await;

        let (envelope, response) = envelope(Request::Read {
            object: "Parallel Slide".to_string(),
            variable: STATUS_VARIABLE.to_string(),
        });
        request_tx.send(envelope).await.unwrap();

        assert_eq!(
            response.await.unwrap(),
            Ok(Response::Value(Variant::String(
                "No devices detected".to_string()
            )))
        );
        assert_eq!(factory.attempts(), 1);
    }
}
