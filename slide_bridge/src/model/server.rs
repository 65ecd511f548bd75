use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::{
    bridge::MethodBinding,
    model::{
        AddressSpace, DataType, MethodDecl, MethodHandle, ModelError, NamespaceIndex,
        ObjectHandle, VariableHandle, Variant,
    },
};

/// Sent to subscribers every time a variable is written.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    pub object: String,
    pub variable: String,
    pub value: Variant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberKind {
    Variable(DataType),
    Method,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseEntry {
    pub namespace: String,
    pub object: String,
    pub member: String,
    pub kind: MemberKind,
}

struct Object {
    namespace: NamespaceIndex,
    name: String,
    variables: Vec<VariableHandle>,
    methods: Vec<MethodHandle>,
}

struct Variable {
    object: ObjectHandle,
    name: String,
    value: Variant,
}

struct Method {
    decl: MethodDecl,
    binding: MethodBinding,
}

/// In-memory address space. Owned by the server loop, so every write and
/// every call resolution happens on one task.
pub struct ModelServer {
    namespaces: Vec<String>,
    objects: Vec<Object>,
    variables: Vec<Variable>,
    methods: Vec<Method>,
    notifications: broadcast::Sender<ChangeNotification>,
}

impl ModelServer {
    pub fn new(notification_capacity: usize) -> Self {
        let (notifications, _) = broadcast::channel(notification_capacity.max(1));

        Self {
            namespaces: Vec::new(),
            objects: Vec::new(),
            variables: Vec::new(),
            methods: Vec::new(),
            notifications,
        }
    }

    /// A sender clone lets the access layer subscribe without going through
    /// the server loop.
    pub fn notifier(&self) -> broadcast::Sender<ChangeNotification> {
        self.notifications.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.notifications.subscribe()
    }

    fn find_object(&self, name: &str) -> Result<&Object, ModelError> {
        self.objects
            .iter()
            .find(|object| object.name == name)
            .ok_or_else(|| ModelError::UnknownObject(name.to_string()))
    }

    fn object(&self, handle: ObjectHandle) -> Result<&Object, ModelError> {
        self.objects
            .get(handle.0)
            .ok_or_else(|| ModelError::UnknownObject(format!("#{}", handle.0)))
    }

    fn member_exists(&self, object: &Object, name: &str) -> bool {
        object
            .variables
            .iter()
            .filter_map(|handle| self.variables.get(handle.0))
            .any(|variable| variable.name == name)
            || object
                .methods
                .iter()
                .filter_map(|handle| self.methods.get(handle.0))
                .any(|method| method.decl.name == name)
    }

    pub fn read(&self, object: &str, variable: &str) -> Result<Variant, ModelError> {
        let object = self.find_object(object)?;
        object
            .variables
            .iter()
            .filter_map(|handle| self.variables.get(handle.0))
            .find(|v| v.name == variable)
            .map(|v| v.value.clone())
            .ok_or_else(|| ModelError::UnknownVariable(variable.to_string()))
    }

    pub fn browse(&self) -> Vec<BrowseEntry> {
        let mut entries = Vec::new();

        for object in &self.objects {
            let namespace = self
                .namespaces
                .get(object.namespace.0 as usize)
                .cloned()
                .unwrap_or_default();

            for variable in object.variables.iter().filter_map(|h| self.variables.get(h.0)) {
                entries.push(BrowseEntry {
                    namespace: namespace.clone(),
                    object: object.name.clone(),
                    member: variable.name.clone(),
                    kind: MemberKind::Variable(variable.value.data_type()),
                });
            }
            for method in object.methods.iter().filter_map(|h| self.methods.get(h.0)) {
                entries.push(BrowseEntry {
                    namespace: namespace.clone(),
                    object: object.name.clone(),
                    member: method.decl.name.to_string(),
                    kind: MemberKind::Method,
                });
            }
        }

        entries
    }

    /// Looks up a method and turns the raw client arguments into typed
    /// values, filling in declared defaults for trailing arguments.
    pub fn resolve_call(
        &self,
        object: &str,
        method: &str,
        args: &[String],
    ) -> Result<(MethodBinding, Vec<Variant>), ModelError> {
        let target = self.find_object(object)?;
        let method = target
            .methods
            .iter()
            .filter_map(|handle| self.methods.get(handle.0))
            .find(|m| m.decl.name == method)
            .ok_or_else(|| ModelError::UnknownMethod(method.to_string()))?;

        let inputs = &method.decl.inputs;
        if args.len() > inputs.len() {
            return Err(ModelError::BadArguments(format!(
                "{} takes at most {} argument(s), got {}",
                method.decl.name,
                inputs.len(),
                args.len()
            )));
        }

        let mut values = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let value = match args.get(index) {
                Some(text) => Variant::parse(input.data_type, text).ok_or_else(|| {
                    ModelError::BadArguments(format!(
                        "'{}' is not a valid {} for '{}'",
                        text, input.data_type, input.name
                    ))
                })?,
                None => input.default.clone().ok_or_else(|| {
                    ModelError::BadArguments(format!("Missing argument '{}'", input.name))
                })?,
            };
            values.push(value);
        }

        Ok((method.binding, values))
    }
}

impl AddressSpace for ModelServer {
    fn register_namespace(&mut self, name: &str) -> NamespaceIndex {
        if let Some(index) = self.namespaces.iter().position(|ns| ns == name) {
            return NamespaceIndex(index as u16);
        }

        self.namespaces.push(name.to_string());
        let index = NamespaceIndex((self.namespaces.len() - 1) as u16);
        debug!("Registered namespace '{}' as {}", name, index.0);
        index
    }

    fn add_object(&mut self, ns: NamespaceIndex, name: &str) -> Result<ObjectHandle, ModelError> {
        if self.namespaces.get(ns.0 as usize).is_none() {
            return Err(ModelError::UnknownNamespace(ns.0));
        }
        if self.objects.iter().any(|object| object.name == name) {
            return Err(ModelError::DuplicateName {
                name: name.to_string(),
            });
        }

        self.objects.push(Object {
            namespace: ns,
            name: name.to_string(),
            variables: Vec::new(),
            methods: Vec::new(),
        });
        Ok(ObjectHandle(self.objects.len() - 1))
    }

    fn add_variable(
        &mut self,
        object: ObjectHandle,
        name: &str,
        initial: Variant,
    ) -> Result<VariableHandle, ModelError> {
        if self.member_exists(self.object(object)?, name) {
            return Err(ModelError::DuplicateName {
                name: name.to_string(),
            });
        }

        let handle = VariableHandle(self.variables.len());
        self.variables.push(Variable {
            object,
            name: name.to_string(),
            value: initial,
        });
        if let Some(owner) = self.objects.get_mut(object.0) {
            owner.variables.push(handle);
        }
        Ok(handle)
    }

    fn add_method(
        &mut self,
        object: ObjectHandle,
        decl: MethodDecl,
        binding: MethodBinding,
    ) -> Result<MethodHandle, ModelError> {
        if self.member_exists(self.object(object)?, decl.name) {
            return Err(ModelError::DuplicateName {
                name: decl.name.to_string(),
            });
        }

        let handle = MethodHandle(self.methods.len());
        self.methods.push(Method { decl, binding });
        if let Some(owner) = self.objects.get_mut(object.0) {
            owner.methods.push(handle);
        }
        Ok(handle)
    }

    fn publish(&mut self, handle: VariableHandle, value: Variant) -> Result<(), ModelError> {
        let variable = self
            .variables
            .get_mut(handle.0)
            .ok_or_else(|| ModelError::UnknownVariable(format!("#{}", handle.0)))?;

        let expected = variable.value.data_type();
        if value.data_type() != expected {
            return Err(ModelError::TypeMismatch {
                variable: variable.name.clone(),
                expected,
                found: value.data_type(),
            });
        }

        variable.value = value.clone();
        let variable_name = variable.name.clone();
        let object_name = variable.object;

        let object = self
            .objects
            .get(object_name.0)
            .map(|object| object.name.clone())
            .unwrap_or_default();
        trace!("{}.{} = {}", object, variable_name, value);

        // No subscribers is not an error.
        let _ = self.notifications.send(ChangeNotification {
            object,
            variable: variable_name,
            value,
        });
        Ok(())
    }
}
