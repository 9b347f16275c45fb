//! The linear `run` pipeline: load, root, calibrate, estimate, export, plot.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument};

use crate::application::services::estimator::DivergenceTimeEstimator;
use crate::application::services::export::ExportService;
use crate::application::services::plot::{PlotFormat, PlotService};
use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::config::Settings;
use crate::domain::{
    is_nexus, parse_newick, parse_nexus, CalibrationTable, DomainError, PhyloTree, Timetree,
};
use crate::infrastructure::traits::FileSystem;

/// A rooted tree with its resolved calibrations, ready for estimation.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub tree: PhyloTree,
    pub table: CalibrationTable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutputs {
    pub newick: PathBuf,
    pub nexus: PathBuf,
    pub plot: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub timetree: Timetree,
    pub table: CalibrationTable,
    pub outputs: RunOutputs,
}

/// Runs the stages strictly in order; the first failure aborts the run.
pub struct PipelineService {
    fs: Arc<dyn FileSystem>,
    estimator: Arc<dyn DivergenceTimeEstimator>,
    exporter: ExportService,
    plotter: PlotService,
}

impl PipelineService {
    pub fn new(fs: Arc<dyn FileSystem>, estimator: Arc<dyn DivergenceTimeEstimator>) -> Self {
        Self {
            exporter: ExportService::new(fs.clone()),
            plotter: PlotService::new(fs.clone()),
            fs,
            estimator,
        }
    }

    /// Read one tree, Nexus if the content starts with `#NEXUS`, Newick otherwise.
    #[instrument(level = "debug", skip(self))]
    pub fn load_tree(&self, path: &Path) -> ApplicationResult<PhyloTree> {
        let source_name = path.display().to_string();
        let text = match self.fs.read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DomainError::parse(source_name, 0, "file not found").into())
            }
            Err(e) => return Err(e).with_path_context("read tree", path),
        };
        let tree = if is_nexus(&text) {
            parse_nexus(&text, &source_name)?
        } else {
            parse_newick(&text, &source_name)?
        };
        info!("loaded {} tips from {}", tree.tip_count(), source_name);
        Ok(tree)
    }

    /// Load and root the tree, then resolve the calibrations against it.
    #[instrument(level = "debug", skip_all)]
    pub fn prepare(&self, settings: &Settings) -> ApplicationResult<Prepared> {
        if settings.tree.as_os_str().is_empty() {
            return Err(ApplicationError::config("no tree file configured"));
        }
        let mut tree = self.load_tree(&settings.tree)?;
        if settings.outgroup.is_empty() {
            return Err(ApplicationError::config("no outgroup configured"));
        }
        tree.root_on_outgroup(&settings.outgroup)?;
        info!("rooted on outgroup {}", settings.outgroup.join(", "));

        let specs = settings.calibration_specs()?;
        let table = CalibrationTable::build(&tree, &specs)?;
        info!("resolved {} calibrations", table.len());
        Ok(Prepared { tree, table })
    }

    #[instrument(level = "debug", skip_all)]
    pub fn run(&self, settings: &Settings) -> ApplicationResult<RunSummary> {
        settings.estimator.validate().map_err(DomainError::from)?;
        settings.plot.validate().map_err(DomainError::from)?;
        let outputs = RunOutputs {
            newick: settings.output.newick_path(),
            nexus: settings.output.nexus_path(),
            plot: settings.output.plot_path(),
        };
        PlotFormat::from_path(&outputs.plot)?;

        let Prepared { tree, table } = self.prepare(settings)?;

        let timetree = self.estimator.estimate(&tree, &table, &settings.estimator)?;
        info!(
            "{} fit: root age {:.4}, {}",
            self.estimator.name(),
            timetree.root_age(),
            timetree.report
        );

        self.exporter.export_newick(&timetree, &outputs.newick)?;
        self.exporter.export_nexus(&timetree, &outputs.nexus)?;
        self.plotter.plot(&timetree, &outputs.plot, &settings.plot)?;

        Ok(RunSummary {
            timetree,
            table,
            outputs,
        })
    }
}
