use crate::types::{FlightLineKey, FootprintError, FootprintResult, PhotoRecord};
use std::collections::{BTreeMap, BTreeSet};

/// How a project's photos split into flown paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectLayout {
    /// One roll, one flight line
    SinglePass,
    /// One roll, several flight lines
    MultiLine,
    /// Several rolls, each with one or more flight lines
    MultiRoll,
}

impl ProjectLayout {
    fn classify(roll_count: usize, line_count: usize) -> Self {
        if roll_count > 1 {
            ProjectLayout::MultiRoll
        } else if line_count > 1 {
            ProjectLayout::MultiLine
        } else {
            ProjectLayout::SinglePass
        }
    }
}

/// Records of one flown path, sorted by exposure number ascending
#[derive(Debug, Clone)]
pub struct FlightLineGroup {
    pub key: FlightLineKey,
    pub records: Vec<PhotoRecord>,
}

impl FlightLineGroup {
    /// Build a group from records sharing one key. Sorting is stable, so
    /// duplicate exposure numbers keep their input order.
    pub fn new(key: FlightLineKey, mut records: Vec<PhotoRecord>) -> FootprintResult<Self> {
        if records.is_empty() {
            return Err(FootprintError::InvalidInput(format!(
                "flight line {} has no photos",
                key
            )));
        }
        if let Some(stray) = records.iter().find(|r| r.flight_line_key() != key) {
            return Err(FootprintError::InvalidInput(format!(
                "photo {} does not belong to flight line {}",
                stray.id, key
            )));
        }
        records.sort_by_key(|r| r.exposure);
        Ok(Self { key, records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// All flight-line groups of one project
#[derive(Debug, Clone)]
pub struct ProjectGroups {
    pub project: String,
    pub layout: ProjectLayout,
    pub groups: Vec<FlightLineGroup>,
}

/// Partition records by project, then by (roll, flight line), and sort every
/// group by exposure. Projects and groups come out in key order.
pub fn partition_projects(records: Vec<PhotoRecord>) -> FootprintResult<Vec<ProjectGroups>> {
    let mut by_project: BTreeMap<String, BTreeMap<FlightLineKey, Vec<PhotoRecord>>> =
        BTreeMap::new();

    for record in records.into_iter() {
        by_project
            .entry(record.project.clone())
            .or_default()
            .entry(record.flight_line_key())
            .or_default()
            .push(record);
    }

    log::info!("Number of projects: {}", by_project.len());

    let mut projects = Vec::with_capacity(by_project.len());
    for (project, lines) in by_project.into_iter() {
        let rolls: BTreeSet<&str> = lines.keys().map(|k| k.roll.as_str()).collect();
        let flight_lines: BTreeSet<&str> = lines.keys().map(|k| k.flight_line.as_str()).collect();
        let layout = ProjectLayout::classify(rolls.len(), flight_lines.len());

        log::debug!(
            "Project {}: {} roll(s), {} flight line(s), {:?}",
            project,
            rolls.len(),
            flight_lines.len(),
            layout
        );

        let groups = lines
            .into_iter()
            .map(|(key, records)| FlightLineGroup::new(key, records))
            .collect::<FootprintResult<Vec<_>>>()?;

        projects.push(ProjectGroups {
            project,
            layout,
            groups,
        });
    }

    Ok(projects)
}

/// Flattened form of [`partition_projects`]: every flight-line group in order
pub fn group_flight_lines(records: Vec<PhotoRecord>) -> FootprintResult<Vec<FlightLineGroup>> {
    Ok(partition_projects(records)?
        .into_iter()
        .flat_map(|p| p.groups)
        .collect())
}
