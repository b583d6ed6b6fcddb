use clap::{Args, Parser, Subcommand, ValueEnum};
use costgraph_units::Dimension;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "costgraph",
    about = "Costgraph: bill-of-materials cost propagation over a JSONL composition store",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Path to the config file (defaults to ./costgraph.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Composition store path; overrides `[store] path`
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an empty composition store
    Init {
        /// Also write a costgraph.toml with default settings if none exists
        #[arg(long)]
        write_config: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a composition
    Add {
        /// Composition ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Display name
        #[arg(long, default_value = "")]
        name: String,

        /// Reference amount the cost applies to, e.g. `2kg`
        #[arg(long)]
        unit: String,

        /// Stock on hand, e.g. `10kg` (defaults to zero of the unit)
        #[arg(long)]
        stock: Option<String>,

        /// Raw cost per unit
        #[arg(long, default_value_t = 0.0)]
        cost: f64,

        /// Dependency as `OF=QUANTITY`, e.g. `flour=200g` (repeatable)
        #[arg(long = "dep")]
        deps: Vec<String>,

        /// Keep the cost manual even when dependencies exist
        #[arg(long)]
        manual_cost: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one composition
    Show {
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List compositions
    List {
        /// Include deleted compositions
        #[arg(long)]
        all: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rename a composition or change its unit or stock
    Edit {
        id: String,

        /// New display name
        #[arg(long)]
        name: Option<String>,

        /// New reference amount, e.g. `1kg`; must stay compatible with every use
        #[arg(long)]
        unit: Option<String>,

        /// New stock on hand, e.g. `12kg`
        #[arg(long)]
        stock: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Dependency edits
    Dep {
        #[command(subcommand)]
        command: DepCommands,
    },

    /// Override the cost of a composition whose cost is manual
    SetCost {
        id: String,

        cost: f64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Switch cost derivation from dependencies on or off
    Autoupdate {
        id: String,

        mode: ToggleArg,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Soft-delete a composition
    Delete {
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List known units
    Units {
        /// Only units of this dimension
        #[arg(long)]
        dimension: Option<DimensionArg>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify two dependency lists (JSON arrays) into removed/unchanged/added
    Diff {
        old: PathBuf,

        new: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum DepCommands {
    /// Add a dependency, or change its quantity
    Add {
        /// Composition that gains the dependency
        id: String,

        /// Composition depended on
        of: String,

        /// Required quantity, e.g. `200g`
        quantity: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a dependency
    Rm {
        id: String,

        of: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ToggleArg {
    #[value(name = "on")]
    On,
    #[value(name = "off")]
    Off,
}

impl ToggleArg {
    pub fn enabled(self) -> bool {
        matches!(self, ToggleArg::On)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DimensionArg {
    #[value(name = "mass")]
    Mass,
    #[value(name = "volume")]
    Volume,
    #[value(name = "length")]
    Length,
    #[value(name = "count")]
    Count,
}

impl From<DimensionArg> for Dimension {
    fn from(arg: DimensionArg) -> Self {
        match arg {
            DimensionArg::Mass => Dimension::Mass,
            DimensionArg::Volume => Dimension::Volume,
            DimensionArg::Length => Dimension::Length,
            DimensionArg::Count => Dimension::Count,
        }
    }
}
