//! Taxes command - inspect and edit the tax schema registry.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use console::style;

use fiscal_core::{DocumentType, TaxDefinition, TaxRegistry, TaxScope};

use super::load_config;

/// Arguments for the taxes command.
#[derive(Args)]
pub struct TaxesArgs {
    /// Tax configuration file (default: from config)
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: TaxesCommand,
}

#[derive(Subcommand)]
enum TaxesCommand {
    /// List tax definitions
    List {
        /// Include disabled taxes
        #[arg(long)]
        all: bool,
    },

    /// Show one tax definition as JSON
    Show {
        /// Tax id (e.g. "icms")
        id: String,
    },

    /// Add a tax definition
    Add {
        /// Tax id, lowercase letters, digits and underscores
        id: String,

        #[command(flatten)]
        definition: DefinitionArgs,
    },

    /// Update an existing tax definition
    Update {
        /// Tax id
        id: String,

        #[command(flatten)]
        definition: DefinitionArgs,
    },

    /// Delete a tax definition
    Delete {
        /// Tax id
        id: String,
    },

    /// Enable or disable a tax
    Toggle {
        /// Tax id
        id: String,
    },

    /// Show the change history
    History,

    /// Write the default tax configuration if none exists
    Init,
}

#[derive(Args)]
struct DefinitionArgs {
    /// Short display name
    #[arg(long)]
    name: Option<String>,

    /// Full legal name
    #[arg(long)]
    full_name: Option<String>,

    /// Free-form description
    #[arg(long)]
    description: Option<String>,

    /// XML total fields summed for this tax (comma separated)
    #[arg(long, value_delimiter = ',')]
    fields: Vec<String>,

    /// Government level
    #[arg(long, value_enum)]
    scope: Option<ScopeArg>,

    /// Document types the tax applies to (comma separated codes, e.g. "NFe,NFCe")
    #[arg(long, value_delimiter = ',')]
    applies_to: Vec<String>,

    /// Chart colour
    #[arg(long)]
    color: Option<String>,

    /// XML element of the per-item tax group (default: uppercased id)
    #[arg(long)]
    item_group: Option<String>,

    /// Create the tax disabled
    #[arg(long)]
    disabled: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum ScopeArg {
    Federal,
    State,
    Municipal,
}

impl From<ScopeArg> for TaxScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Federal => TaxScope::Federal,
            ScopeArg::State => TaxScope::State,
            ScopeArg::Municipal => TaxScope::Municipal,
        }
    }
}

pub async fn run(args: TaxesArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let path = args.registry.unwrap_or(config.registry.path);

    if let TaxesCommand::Init = args.command {
        let existed = path.exists();
        let registry = TaxRegistry::init_default(&path)?;
        if existed {
            println!(
                "{} Tax configuration already exists at {}",
                style("ℹ").blue(),
                path.display()
            );
        } else {
            println!(
                "{} Created tax configuration with {} taxes at {}",
                style("✓").green(),
                registry.list(false)?.len(),
                path.display()
            );
        }
        return Ok(());
    }

    if !path.exists() {
        anyhow::bail!(
            "Tax configuration not found at {}. Run 'fiscal taxes init' to create it.",
            path.display()
        );
    }
    let registry = TaxRegistry::open(&path)?.with_author(config.registry.author);

    match args.command {
        TaxesCommand::List { all } => list(&registry, all),
        TaxesCommand::Show { id } => show(&registry, &id),
        TaxesCommand::Add { id, definition } => add(&registry, id, definition),
        TaxesCommand::Update { id, definition } => update(&registry, &id, definition),
        TaxesCommand::Delete { id } => delete(&registry, &id),
        TaxesCommand::Toggle { id } => toggle(&registry, &id),
        TaxesCommand::History => history(&registry),
        TaxesCommand::Init => Ok(()),
    }
}

fn scope_label(scope: TaxScope) -> &'static str {
    match scope {
        TaxScope::Federal => "federal",
        TaxScope::State => "state",
        TaxScope::Municipal => "municipal",
    }
}

fn list(registry: &TaxRegistry, all: bool) -> anyhow::Result<()> {
    let taxes = registry.list(!all)?;
    if taxes.is_empty() {
        println!("No taxes configured.");
        return Ok(());
    }

    println!(
        "{}",
        style(format!(
            "{:<10} {:<10} {:<10} {:<24} {}",
            "ID", "NAME", "SCOPE", "FIELDS", "ENABLED"
        ))
        .bold()
    );
    for tax in &taxes {
        let enabled = if tax.enabled {
            style("yes").green()
        } else {
            style("no").red()
        };
        println!(
            "{:<10} {:<10} {:<10} {:<24} {}",
            tax.id,
            tax.name,
            scope_label(tax.scope),
            tax.xml_fields.join(", "),
            enabled
        );
    }
    Ok(())
}

fn show(registry: &TaxRegistry, id: &str) -> anyhow::Result<()> {
    let tax = registry
        .get(id)?
        .ok_or_else(|| anyhow::anyhow!("Tax not found: {}", id))?;
    println!("{}", serde_json::to_string_pretty(&tax)?);
    Ok(())
}

fn parse_types(codes: &[String]) -> anyhow::Result<Vec<DocumentType>> {
    codes
        .iter()
        .map(|c| {
            DocumentType::from_code(c).ok_or_else(|| anyhow::anyhow!("Unknown document type: {}", c))
        })
        .collect()
}

fn add(registry: &TaxRegistry, id: String, args: DefinitionArgs) -> anyhow::Result<()> {
    let Some(name) = args.name else {
        anyhow::bail!("--name is required when adding a tax");
    };
    let Some(scope) = args.scope else {
        anyhow::bail!("--scope is required when adding a tax");
    };
    if args.fields.is_empty() {
        anyhow::bail!("--fields is required when adding a tax");
    }

    let fields: Vec<&str> = args.fields.iter().map(String::as_str).collect();
    let mut definition = TaxDefinition::new(id.clone(), name, scope.into(), &fields)
        .with_applies_to(&parse_types(&args.applies_to)?)
        .with_enabled(!args.disabled);
    if let Some(full_name) = args.full_name {
        definition = definition.with_full_name(full_name);
    }
    if let Some(description) = args.description {
        definition = definition.with_description(description);
    }
    if let Some(color) = args.color {
        definition = definition.with_color(color);
    }
    if let Some(group) = args.item_group {
        definition = definition.with_item_group(group);
    }

    if !registry.add(definition)? {
        anyhow::bail!("Tax {} already exists", id);
    }
    println!("{} Added tax {}", style("✓").green(), id);
    Ok(())
}

fn update(registry: &TaxRegistry, id: &str, args: DefinitionArgs) -> anyhow::Result<()> {
    let mut definition = registry
        .get(id)?
        .ok_or_else(|| anyhow::anyhow!("Tax not found: {}", id))?;

    if let Some(name) = args.name {
        definition.name = name;
    }
    if let Some(full_name) = args.full_name {
        definition.full_name = full_name;
    }
    if let Some(description) = args.description {
        definition.description = description;
    }
    if !args.fields.is_empty() {
        definition.xml_fields = args.fields;
    }
    if let Some(scope) = args.scope {
        definition.scope = scope.into();
    }
    if !args.applies_to.is_empty() {
        definition.applies_to = parse_types(&args.applies_to)?;
    }
    if let Some(color) = args.color {
        definition.color = color;
    }
    if let Some(group) = args.item_group {
        definition.item_group = Some(group);
    }
    if args.disabled {
        definition.enabled = false;
    }

    if !registry.update(id, definition)? {
        anyhow::bail!("Tax not found: {}", id);
    }
    println!("{} Updated tax {}", style("✓").green(), id);
    Ok(())
}

fn delete(registry: &TaxRegistry, id: &str) -> anyhow::Result<()> {
    if !registry.delete(id)? {
        anyhow::bail!("Tax not found: {}", id);
    }
    println!("{} Deleted tax {}", style("✓").green(), id);
    Ok(())
}

fn toggle(registry: &TaxRegistry, id: &str) -> anyhow::Result<()> {
    match registry.toggle(id)? {
        Some(true) => println!("{} Tax {} enabled", style("✓").green(), id),
        Some(false) => println!("{} Tax {} disabled", style("✓").green(), id),
        None => anyhow::bail!("Tax not found: {}", id),
    }
    Ok(())
}

fn history(registry: &TaxRegistry) -> anyhow::Result<()> {
    let entries = registry.history()?;
    if entries.is_empty() {
        println!("No changes recorded.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{}  {:<30} {}",
            style(&entry.timestamp).dim(),
            entry.description,
            style(&entry.author).cyan()
        );
    }
    Ok(())
}
