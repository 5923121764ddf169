//! `testbench bindings`: edit the data bindings stored in a mapping file.

use std::{
    io::{BufRead, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use testbench_engine::{BindingRepository, DataBindingModel, FileBindingRepository};
use testbench_types::DataTransform;

#[derive(Debug, Args)]
pub struct MappingFile {
    /// Mapping document (`.json`, `.yaml` or `.yml`)
    #[arg(long, short = 'f')]
    pub file: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum BindingsCommand {
    /// List bindings and unmapped target inputs
    Show(MappingFile),
    /// Bind a source output path to a target parameter
    Bind {
        #[command(flatten)]
        mapping: MappingFile,
        /// Source output path, e.g. `response.body.userId`
        #[arg(long)]
        source: String,
        /// Target input parameter name
        #[arg(long)]
        target: String,
    },
    /// Bind unbound target inputs to source outputs with the same name
    AutoMap(MappingFile),
    /// Set or remove the transform of a binding
    #[command(group = clap::ArgGroup::new("transform").required(true).args(["function", "template", "none"]))]
    Transform {
        #[command(flatten)]
        mapping: MappingFile,
        binding_id: String,
        #[arg(long)]
        function: Option<String>,
        #[arg(long)]
        template: Option<String>,
        /// Remove the transform
        #[arg(long)]
        none: bool,
    },
    /// Delete one binding
    Delete {
        #[command(flatten)]
        mapping: MappingFile,
        binding_id: String,
    },
    /// Delete every binding
    Clear {
        #[command(flatten)]
        mapping: MappingFile,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Print the target step configuration the bindings produce
    Preview(MappingFile),
}

impl BindingsCommand {
    pub fn mapping_file(&self) -> &MappingFile {
        match self {
            BindingsCommand::Show(mapping) | BindingsCommand::AutoMap(mapping) | BindingsCommand::Preview(mapping) => mapping,
            BindingsCommand::Bind { mapping, .. }
            | BindingsCommand::Transform { mapping, .. }
            | BindingsCommand::Delete { mapping, .. }
            | BindingsCommand::Clear { mapping, .. } => mapping,
        }
    }
}

/// Runs a bindings command against the mapping file it names, prompting on stdin for `clear`.
pub fn run(command: BindingsCommand) -> Result<()> {
    let repository = FileBindingRepository::new(command.mapping_file().file.clone());
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let confirm = |count: usize| {
        let mut out = std::io::stderr();
        let _ = write!(out, "Delete all {count} bindings? [y/N] ");
        let _ = out.flush();
        let mut answer = String::new();
        stdin.lock().read_line(&mut answer).is_ok() && matches!(answer.trim(), "y" | "Y" | "yes")
    };
    execute(command, &repository, confirm, &mut stdout.lock())
}

/// Loads the document, applies `command`, and saves it when the command edits.
pub fn execute(
    command: BindingsCommand,
    repository: &dyn BindingRepository,
    confirm: impl FnOnce(usize) -> bool,
    out: &mut impl Write,
) -> Result<()> {
    let document = repository.load().context("failed to load mapping document")?;
    let mut model = DataBindingModel::from_document(document);

    match command {
        BindingsCommand::Show(_) => {
            write_bindings(&model, out)?;
            return Ok(());
        }
        BindingsCommand::Preview(_) => {
            writeln!(out, "{}", serde_json::to_string_pretty(&model.config_preview())?)?;
            return Ok(());
        }
        BindingsCommand::Bind { source, target, .. } => {
            let binding = model.create_binding(&source, &target)?;
            writeln!(out, "Created {}: {} -> {}", binding.id, binding.source_path, binding.target_param)?;
        }
        BindingsCommand::AutoMap(_) => {
            let created = model.auto_map();
            writeln!(out, "Auto-mapped {} binding(s)", created.len())?;
        }
        BindingsCommand::Transform {
            binding_id,
            function,
            template,
            ..
        } => {
            let transform = match (function, template) {
                (Some(function), _) => Some(DataTransform::Function { function }),
                (None, Some(template)) => Some(DataTransform::Template { template }),
                (None, None) => None,
            };
            model.set_transform(&binding_id, transform)?;
            writeln!(out, "Updated {binding_id}")?;
        }
        BindingsCommand::Delete { binding_id, .. } => {
            let removed = model.delete_binding(&binding_id)?;
            writeln!(out, "Deleted {}: {} -> {}", removed.id, removed.source_path, removed.target_param)?;
        }
        BindingsCommand::Clear { yes, .. } => {
            let removed = model.clear_all(|count| yes || confirm(count));
            if removed == 0 {
                writeln!(out, "No bindings removed")?;
                return Ok(());
            }
            writeln!(out, "Removed {removed} binding(s)")?;
        }
    }

    repository.save(&model.to_document()).context("failed to save mapping document")?;
    writeln!(out, "{}", model.summary())?;
    Ok(())
}

fn write_bindings(model: &DataBindingModel, out: &mut impl Write) -> Result<()> {
    writeln!(out, "{} -> {}", model.source().name, model.target().name)?;
    for binding in model.bindings() {
        let transform = binding
            .transform
            .as_ref()
            .map(|transform| format!("  ({})", transform.expression()))
            .unwrap_or_default();
        writeln!(out, "  {}  {} -> {}{}", binding.id, binding.source_path, binding.target_param, transform)?;
    }
    let unmapped: Vec<&str> = model
        .target_inputs()
        .iter()
        .filter(|field| !model.is_target_bound(&field.name))
        .map(|field| field.name.as_str())
        .collect();
    if !unmapped.is_empty() {
        writeln!(out, "  unmapped: {}", unmapped.join(", "))?;
    }
    writeln!(out, "{}", model.summary())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use testbench_engine::InMemoryBindingRepository;
    use testbench_types::{DataField, MappingDocument, StepEndpoint};

    use super::*;

    fn repository() -> InMemoryBindingRepository {
        let model = DataBindingModel::new(
            StepEndpoint::new("step-1", "Login"),
            StepEndpoint::new("step-2", "Get Profile"),
            vec![
                DataField::output("userId", "response.body.userId"),
                DataField::output("token", "response.body.token"),
            ],
            vec![DataField::input("userId"), DataField::input("token"), DataField::input("locale")],
        );
        InMemoryBindingRepository::new(model.to_document())
    }

    fn mapping() -> MappingFile {
        MappingFile {
            file: PathBuf::from("unused.json"),
        }
    }

    fn run_command(repository: &InMemoryBindingRepository, command: BindingsCommand, answer: bool) -> String {
        let mut out = Vec::new();
        execute(command, repository, |_| answer, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn stored(repository: &InMemoryBindingRepository) -> MappingDocument {
        repository.load().unwrap()
    }

    #[test]
    fn auto_map_then_show() {
        let repository = repository();
        let output = run_command(&repository, BindingsCommand::AutoMap(mapping()), false);
        assert!(output.starts_with("Auto-mapped 2 binding(s)"));
        assert!(output.contains("2 bindings configured (1 unmapped)"));

        let shown = run_command(&repository, BindingsCommand::Show(mapping()), false);
        assert!(shown.contains("binding-1  response.body.userId -> userId"));
        assert!(shown.contains("unmapped: locale"));
    }

    #[test]
    fn bind_transform_and_delete_are_saved() {
        let repository = repository();
        run_command(
            &repository,
            BindingsCommand::Bind {
                mapping: mapping(),
                source: "response.body.token".to_string(),
                target: "token".to_string(),
            },
            false,
        );
        run_command(
            &repository,
            BindingsCommand::Transform {
                mapping: mapping(),
                binding_id: "binding-1".to_string(),
                function: None,
                template: Some("Bearer {{value}}".to_string()),
                none: false,
            },
            false,
        );
        let binding = &stored(&repository).bindings[0];
        assert_eq!(
            binding.transform,
            Some(DataTransform::Template {
                template: "Bearer {{value}}".to_string()
            })
        );

        run_command(
            &repository,
            BindingsCommand::Delete {
                mapping: mapping(),
                binding_id: "binding-1".to_string(),
            },
            false,
        );
        assert!(stored(&repository).bindings.is_empty());
    }

    #[test]
    fn unknown_ids_fail_without_saving() {
        let repository = repository();
        let mut out = Vec::new();
        let command = BindingsCommand::Delete {
            mapping: mapping(),
            binding_id: "binding-9".to_string(),
        };
        assert!(execute(command, &repository, |_| true, &mut out).is_err());
    }

    #[test]
    fn clear_honours_confirmation() {
        let repository = repository();
        run_command(&repository, BindingsCommand::AutoMap(mapping()), false);

        let declined = run_command(&repository, BindingsCommand::Clear { mapping: mapping(), yes: false }, false);
        assert_eq!(declined, "No bindings removed\n");
        assert_eq!(stored(&repository).bindings.len(), 2);

        let forced = run_command(&repository, BindingsCommand::Clear { mapping: mapping(), yes: true }, false);
        assert!(forced.starts_with("Removed 2 binding(s)"));
        assert!(stored(&repository).bindings.is_empty());
    }

    #[test]
    fn preview_prints_target_configuration() {
        let repository = repository();
        run_command(&repository, BindingsCommand::AutoMap(mapping()), false);
        let preview = run_command(&repository, BindingsCommand::Preview(mapping()), false);
        let value: serde_json::Value = serde_json::from_str(&preview).unwrap();
        assert_eq!(value["inputs"]["userId"], "{{response.body.userId}}");
        assert_eq!(value["id"], "step-2");
    }
}
