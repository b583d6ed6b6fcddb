use crate::cli::GlobalArgs;
use costgraph_cascade::{
    CascadeContext, CascadeCoordinator, CompositionService, CoordinatorHandle, CostgraphConfig,
    JsonlRepository, MemoryBus,
};
use costgraph_memory::Composition;
use costgraph_units::{CostError, UnitRegistry};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("error: {message}");
    std::process::exit(1);
}

pub fn or_exit<T>(result: Result<T, CostError>) -> T {
    result.unwrap_or_else(|e| fail(format!("{} ({})", e, e.kind().as_str())))
}

pub fn load_config_or_exit(global: &GlobalArgs) -> CostgraphConfig {
    let mut config =
        CostgraphConfig::load(global.config.as_deref()).unwrap_or_else(|e| fail(e));
    if let Some(store) = &global.store {
        config.store.path = store.clone();
    }
    config
}

/// `RUST_LOG` wins over `[log] filter`. Logs go to stderr.
pub fn init_tracing(config: &CostgraphConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.filter))
        .unwrap_or_else(|_| EnvFilter::new(costgraph_cascade::DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

pub fn print_json(payload: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(payload).expect("json serialization")
    );
}

pub fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).expect("json serialization")
}

pub fn yes_no(ok: bool) -> &'static str {
    if ok { "yes" } else { "no" }
}

/// Service and coordinator over the configured JSONL store, with the
/// coordinator's workers running on a private runtime.
pub struct Engine {
    runtime: tokio::runtime::Runtime,
    service: CompositionService,
    bus: Arc<MemoryBus>,
    handle: Option<CoordinatorHandle>,
    settle_timeout: Duration,
    store_path: PathBuf,
}

impl Engine {
    pub fn open_or_exit(config: &CostgraphConfig) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap_or_else(|e| fail(format!("failed to start runtime: {e}")));

        let bus = Arc::new(MemoryBus::new());
        let ctx = CascadeContext::new(
            Arc::new(JsonlRepository::new(&config.store.path)),
            bus.clone(),
            Arc::new(UnitRegistry::standard()),
            config.topology(),
        );
        let coordinator = Arc::new(CascadeCoordinator::new(ctx.clone()));
        let handle = or_exit(runtime.block_on(Arc::clone(&coordinator).spawn()));

        let engine = Self {
            runtime,
            service: CompositionService::new(ctx),
            bus,
            handle: Some(handle),
            settle_timeout: config.cascade.settle_timeout(),
            store_path: config.store.path.clone(),
        };

        // Waves whose events died with an earlier process.
        let resumed = or_exit(engine.block_on(coordinator.resume_pending()));
        if !resumed.is_empty() {
            engine.settle();
        }
        engine
    }

    pub fn service(&self) -> &CompositionService {
        &self.service
    }

    pub fn store_path(&self) -> &std::path::Path {
        &self.store_path
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Current cost of every stored composition.
    pub fn costs(&self) -> BTreeMap<String, f64> {
        or_exit(self.block_on(self.service.list(true)))
            .into_iter()
            .map(|c| (c.id, c.cost))
            .collect()
    }

    /// Wait for the cascade to drain. Returns `false` on timeout.
    pub fn settle(&self) -> bool {
        let settled = self
            .block_on(async {
                tokio::time::timeout(self.settle_timeout, self.bus.wait_idle()).await
            })
            .is_ok();
        if !settled {
            warn!(
                in_flight = self.bus.in_flight(),
                timeout_ms = self.settle_timeout.as_millis() as u64,
                "cascade did not settle"
            );
        }
        settled
    }

    /// Run `mutation`, wait for the cascade, and report which costs moved.
    pub fn mutate<F>(&self, mutation: F) -> MutationOutcome
    where
        F: Future<Output = Result<Composition, CostError>>,
    {
        let before = self.costs();
        let target = or_exit(self.block_on(mutation));
        let settled = self.settle();
        let after = self.costs();

        let cascaded = after
            .iter()
            .filter(|(id, _)| **id != target.id)
            .filter_map(|(id, cost)| {
                let previous = before.get(id).copied();
                match previous {
                    Some(previous) if costgraph_units::approx_eq(previous, *cost) => None,
                    _ => Some(CostChange {
                        id: id.clone(),
                        before: previous,
                        after: *cost,
                    }),
                }
            })
            .collect();

        let composition =
            or_exit(self.block_on(self.service.get(&target.id)));
        MutationOutcome {
            composition,
            cascaded,
            settled,
        }
    }

    pub fn close(mut self) {
        if let Some(handle) = self.handle.take() {
            self.runtime.block_on(handle.shutdown());
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostChange {
    pub id: String,
    pub before: Option<f64>,
    pub after: f64,
}

#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub composition: Composition,
    pub cascaded: Vec<CostChange>,
    pub settled: bool,
}

impl MutationOutcome {
    pub fn payload(&self, action: &str, store: &std::path::Path) -> Value {
        json!({
            "action": action,
            "storePath": store.display().to_string(),
            "composition": to_value(&self.composition),
            "cascade": {
                "settled": self.settled,
                "changed": to_value(&self.cascaded),
            }
        })
    }

    pub fn print(&self, action: &str, store: &std::path::Path, json_output: bool) {
        if json_output {
            print_json(&self.payload(action, store));
            return;
        }
        println!("costgraph {action}");
        print_composition(&self.composition);
        println!("  Path: {}", store.display());
        if !self.settled {
            println!("  cascade: not settled");
        }
        if self.cascaded.is_empty() {
            println!("  cascade: no other costs changed");
        } else {
            println!("  cascade:");
            for change in &self.cascaded {
                match change.before {
                    Some(before) => println!("    {}: {} -> {}", change.id, before, change.after),
                    None => println!("    {}: {}", change.id, change.after),
                }
            }
        }
    }
}

pub fn print_composition(composition: &Composition) {
    if composition.name.is_empty() {
        println!("  {}", composition.id);
    } else {
        println!("  {} ({})", composition.id, composition.name);
    }
    println!("    cost: {} per {}", composition.cost, composition.unit);
    println!("    stock: {}", composition.stock);
    println!(
        "    autoupdate cost: {}",
        yes_no(composition.autoupdate_cost)
    );
    println!("    enabled: {}", yes_no(composition.enabled));
    if composition.needs_uses_recompute {
        println!("    uses pending recompute: yes");
    }
    if !composition.dependencies.is_empty() {
        println!("    dependencies:");
        for dep in &composition.dependencies {
            println!("      - {} x {} = {}", dep.of, dep.quantity, dep.subvalue);
        }
    }
}
