use serde_json::{Map as JsonMap, Value, json};
use testbench_types::{DataBinding, DataField, DataTransform, MappingDocument, StepEndpoint};
use tracing::debug;

use super::BindingError;

/// Field picked by the first half of the click-source-then-click-target gesture.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    None,
    /// A source output, by path.
    Source(String),
    /// A target input, by parameter name.
    Target(String),
}

/// Editable mapping between one source step's outputs and one target step's inputs.
///
/// Each target parameter has at most one binding: binding a parameter again
/// replaces its previous binding.
#[derive(Debug, Clone, Default)]
pub struct DataBindingModel {
    source: StepEndpoint,
    target: StepEndpoint,
    source_outputs: Vec<DataField>,
    target_inputs: Vec<DataField>,
    bindings: Vec<DataBinding>,
    selection: Selection,
    next_sequence: u64,
}

impl DataBindingModel {
    pub fn new(source: StepEndpoint, target: StepEndpoint, source_outputs: Vec<DataField>, target_inputs: Vec<DataField>) -> Self {
        Self {
            source,
            target,
            source_outputs,
            target_inputs,
            ..Self::default()
        }
    }

    /// Restores a model, continuing the id sequence after the stored bindings.
    pub fn from_document(document: MappingDocument) -> Self {
        let next_sequence = document
            .bindings
            .iter()
            .filter_map(|binding| binding.id.strip_prefix("binding-")?.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        Self {
            source: document.source,
            target: document.target,
            source_outputs: document.source_outputs,
            target_inputs: document.target_inputs,
            bindings: document.bindings,
            selection: Selection::None,
            next_sequence,
        }
    }

    pub fn to_document(&self) -> MappingDocument {
        MappingDocument {
            source: self.source.clone(),
            target: self.target.clone(),
            source_outputs: self.source_outputs.clone(),
            target_inputs: self.target_inputs.clone(),
            bindings: self.bindings.clone(),
        }
    }

    pub fn source(&self) -> &StepEndpoint {
        &self.source
    }

    pub fn target(&self) -> &StepEndpoint {
        &self.target
    }

    pub fn source_outputs(&self) -> &[DataField] {
        &self.source_outputs
    }

    pub fn target_inputs(&self) -> &[DataField] {
        &self.target_inputs
    }

    pub fn bindings(&self) -> &[DataBinding] {
        &self.bindings
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Binds `source_path` to `target_param`, replacing any binding of that parameter.
    pub fn create_binding(&mut self, source_path: &str, target_param: &str) -> Result<&DataBinding, BindingError> {
        let source_type = self
            .source_outputs
            .iter()
            .find(|field| field.path == source_path)
            .ok_or_else(|| BindingError::UnknownSource(source_path.to_string()))?
            .field_type
            .clone();
        let target_type = self
            .target_inputs
            .iter()
            .find(|field| field.name == target_param)
            .ok_or_else(|| BindingError::UnknownTarget(target_param.to_string()))?
            .field_type
            .clone();

        let replaced = self.bindings.len();
        self.bindings.retain(|binding| binding.target_param != target_param);
        if self.bindings.len() != replaced {
            debug!(target_param, "replacing existing binding");
        }

        let binding = DataBinding {
            id: self.next_id(),
            source_step_id: self.source.id.clone(),
            source_path: source_path.to_string(),
            source_type,
            target_step_id: self.target.id.clone(),
            target_param: target_param.to_string(),
            target_type,
            transform: None,
        };
        self.selection = Selection::None;
        self.bindings.push(binding);
        Ok(&self.bindings[self.bindings.len() - 1])
    }

    /// Source half of the gesture. Returns the id of a binding when one was created.
    pub fn click_source(&mut self, path: &str) -> Result<Option<String>, BindingError> {
        if let Selection::Target(param) = &self.selection {
            let param = param.clone();
            return self.create_binding(path, &param).map(|binding| Some(binding.id.clone()));
        }
        self.selection = Selection::Source(path.to_string());
        Ok(None)
    }

    /// Target half of the gesture. Returns the id of a binding when one was created.
    pub fn click_target(&mut self, param: &str) -> Result<Option<String>, BindingError> {
        if let Selection::Source(path) = &self.selection {
            let path = path.clone();
            return self.create_binding(&path, param).map(|binding| Some(binding.id.clone()));
        }
        self.selection = Selection::Target(param.to_string());
        Ok(None)
    }

    /// Binds every unbound target input to the first unbound source output with
    /// the same name, compared case-insensitively. Returns the new binding ids.
    pub fn auto_map(&mut self) -> Vec<String> {
        let mut created = Vec::new();
        for index in 0..self.target_inputs.len() {
            let target_name = self.target_inputs[index].name.clone();
            if self.is_target_bound(&target_name) {
                continue;
            }
            let target_key = target_name.to_lowercase();
            let source_path = self
                .source_outputs
                .iter()
                .find(|source| source.name.to_lowercase() == target_key && !self.is_source_bound(&source.path))
                .map(|source| source.path.clone());
            let Some(source_path) = source_path else {
                continue;
            };
            if let Ok(binding) = self.create_binding(&source_path, &target_name) {
                created.push(binding.id.clone());
            }
        }
        debug!(created = created.len(), "auto-mapped bindings");
        created
    }

    pub fn delete_binding(&mut self, binding_id: &str) -> Result<DataBinding, BindingError> {
        let position = self
            .bindings
            .iter()
            .position(|binding| binding.id == binding_id)
            .ok_or_else(|| BindingError::UnknownBinding(binding_id.to_string()))?;
        Ok(self.bindings.remove(position))
    }

    /// Removes every binding once `confirm` agrees. `confirm` receives the
    /// number of bindings and is not consulted when there are none.
    ///
    /// Returns how many bindings were removed.
    pub fn clear_all(&mut self, confirm: impl FnOnce(usize) -> bool) -> usize {
        let count = self.bindings.len();
        if count == 0 || !confirm(count) {
            return 0;
        }
        self.bindings.clear();
        self.selection = Selection::None;
        count
    }

    /// Attaches or removes the transform declared on a binding.
    pub fn set_transform(&mut self, binding_id: &str, transform: Option<DataTransform>) -> Result<(), BindingError> {
        let binding = self
            .bindings
            .iter_mut()
            .find(|binding| binding.id == binding_id)
            .ok_or_else(|| BindingError::UnknownBinding(binding_id.to_string()))?;
        binding.transform = transform;
        Ok(())
    }

    pub fn is_source_bound(&self, path: &str) -> bool {
        self.bindings.iter().any(|binding| binding.source_path == path)
    }

    pub fn is_target_bound(&self, param: &str) -> bool {
        self.bindings.iter().any(|binding| binding.target_param == param)
    }

    pub fn binding_for_target(&self, param: &str) -> Option<&DataBinding> {
        self.bindings.iter().find(|binding| binding.target_param == param)
    }

    /// Target inputs without a binding.
    pub fn unmapped_count(&self) -> usize {
        self.target_inputs.iter().filter(|field| !self.is_target_bound(&field.name)).count()
    }

    /// Footer line of the editor.
    pub fn summary(&self) -> String {
        let count = self.bindings.len();
        if count == 0 {
            return "Click source field, then target field to create a binding".to_string();
        }
        let noun = if count == 1 { "binding" } else { "bindings" };
        match self.unmapped_count() {
            0 => format!("{count} {noun} configured"),
            unmapped => format!("{count} {noun} configured ({unmapped} unmapped)"),
        }
    }

    /// Target step configuration reflecting the current bindings.
    pub fn config_preview(&self) -> Value {
        let inputs: JsonMap<String, Value> = self
            .bindings
            .iter()
            .map(|binding| (binding.target_param.clone(), Value::String(format!("{{{{{}}}}}", binding.source_path))))
            .collect();
        json!({
            "id": self.target.id,
            "name": self.target.name,
            "inputs": inputs,
            "dataBindings": self.bindings,
        })
    }

    fn next_id(&mut self) -> String {
        self.next_sequence += 1;
        format!("binding-{}", self.next_sequence)
    }
}
