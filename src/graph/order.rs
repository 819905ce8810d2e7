//! Emission order for every object of the output script.
//!
//! Data tables are loaded in topological order of the SCC condensation of
//! the foreign-key graph (parents first). Members of a cycle are loaded in
//! alphabetical order and every foreign key inside the cycle is deferred.
//! Ties are always broken by qualified name so that the order is a pure
//! function of the catalog and the plan.

use super::scc::strongly_connected_components;
use super::DependencyGraph;
use crate::catalog::{Catalog, Partitioning, QualifiedName, TableId, TypeKind};
use crate::error::{Result, SampleError};
use crate::rules::SamplingPlan;
use ahash::{AHashMap, AHashSet};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Ordered positions into the catalog for each phase of the script
#[derive(Debug, Clone, Default)]
pub struct EmissionOrder {
    /// Schemas to create
    pub schemas: Vec<String>,
    /// Indices into `catalog.extensions`
    pub extensions: Vec<usize>,
    /// Indices into `catalog.types`, dependencies first
    pub types: Vec<usize>,
    /// Kept tables in creation order (partition parents before children)
    pub tables: Vec<TableId>,
    /// Indices into `catalog.sequences`
    pub sequences: Vec<usize>,
    /// Data tables in load order
    pub data: Vec<TableId>,
    /// Cyclic components, members sorted by name
    pub cycles: Vec<Vec<TableId>>,
    /// Indices into `graph.edges` whose target row may be loaded later
    pub deferred: Vec<usize>,
    /// (table, constraint position) of PRIMARY KEY and UNIQUE constraints
    pub key_constraints: Vec<(TableId, usize)>,
    /// (table, index position)
    pub indexes: Vec<(TableId, usize)>,
    /// (table, constraint position); acyclic ones first, then deferred ones
    pub foreign_keys: Vec<(TableId, usize)>,
    /// Indices into `catalog.views`; plain views before materialized ones
    /// where dependencies allow
    pub views: Vec<usize>,
    /// Indices into `catalog.functions`
    pub functions: Vec<usize>,
    /// Indices into `catalog.triggers`
    pub triggers: Vec<usize>,
    pub warnings: Vec<String>,
}

impl EmissionOrder {
    pub fn compute(catalog: &Catalog, plan: &SamplingPlan, graph: &DependencyGraph) -> Result<Self> {
        let mut order = EmissionOrder::default();

        let mut tables: Vec<TableId> = catalog
            .iter()
            .filter(|t| plan.is_kept(t.id))
            .map(|t| t.id)
            .collect();
        tables.sort_by_cached_key(|&id| (partition_depth(catalog, id), catalog.table(id).qualified()));
        order.tables = tables;

        let table_schemas: AHashSet<&str> = order
            .tables
            .iter()
            .map(|&id| catalog.table(id).schema.as_str())
            .collect();

        order.extensions = (0..catalog.extensions.len()).collect();
        order.types = type_order(catalog, &order.tables, &table_schemas)?;
        order.sequences = sequence_order(catalog, plan, &table_schemas);
        order.compute_data_order(catalog, plan, graph);
        order.compute_constraints(catalog, plan, graph);
        order.compute_views(catalog, plan);

        order.functions = catalog
            .functions
            .iter()
            .enumerate()
            .filter(|(_, f)| table_schemas.contains(f.name.schema.as_str()))
            .map(|(i, _)| i)
            .collect();

        order.triggers = catalog
            .triggers
            .iter()
            .enumerate()
            .filter(|(_, t)| catalog.table_id(&t.table).is_some_and(|id| plan.is_kept(id)))
            .map(|(i, _)| i)
            .collect();

        let mut schemas: Vec<String> = table_schemas.iter().map(|s| s.to_string()).collect();
        for name in order
            .types
            .iter()
            .map(|&i| &catalog.types[i].name)
            .chain(order.sequences.iter().map(|&i| &catalog.sequences[i].name))
            .chain(order.views.iter().map(|&i| &catalog.views[i].name))
        {
            if !schemas.contains(&name.schema) {
                schemas.push(name.schema.clone());
            }
        }
        schemas.sort();
        order.schemas = schemas;

        Ok(order)
    }

    fn compute_data_order(&mut self, catalog: &Catalog, plan: &SamplingPlan, graph: &DependencyGraph) {
        let adjacency = graph.adjacency();
        let components: Vec<Vec<TableId>> = strongly_connected_components(&adjacency)
            .into_iter()
            .map(|scc| {
                let mut members: Vec<TableId> = scc
                    .into_iter()
                    .map(|i| TableId(i as u32))
                    .filter(|&id| plan.table_plan(id).is_some())
                    .collect();
                members.sort_by_cached_key(|&id| catalog.table(id).qualified());
                members
            })
            .filter(|members| !members.is_empty())
            .collect();

        let mut component_of: AHashMap<TableId, usize> = AHashMap::new();
        for (c, members) in components.iter().enumerate() {
            for &id in members {
                component_of.insert(id, c);
            }
        }

        // Kahn over the condensation: a component is ready once every
        // component it references has been loaded.
        let mut waiting_on = vec![AHashSet::new(); components.len()];
        let mut dependents = vec![AHashSet::new(); components.len()];
        for edge in &graph.edges {
            let (Some(&child), Some(&parent)) = (
                component_of.get(&edge.child_data),
                component_of.get(&edge.parent_data),
            ) else {
                continue;
            };
            if child != parent {
                waiting_on[child].insert(parent);
                dependents[parent].insert(child);
            }
        }

        let key = |c: usize| catalog.table(components[c][0]).qualified();
        let mut ready: BinaryHeap<Reverse<(QualifiedName, usize)>> = (0..components.len())
            .filter(|&c| waiting_on[c].is_empty())
            .map(|c| Reverse((key(c), c)))
            .collect();

        while let Some(Reverse((_, c))) = ready.pop() {
            self.data.extend(components[c].iter().copied());
            let mut unblocked: Vec<usize> = dependents[c].iter().copied().collect();
            unblocked.sort_unstable();
            for d in unblocked {
                waiting_on[d].remove(&c);
                if waiting_on[d].is_empty() {
                    ready.push(Reverse((key(d), d)));
                }
            }
        }

        for (c, members) in components.iter().enumerate() {
            let cyclic = members.len() > 1 || graph.has_self_loop(members[0]);
            if !cyclic {
                continue;
            }
            self.cycles.push(members.clone());
            for (i, edge) in graph.edges.iter().enumerate() {
                if component_of.get(&edge.child_data) == Some(&c)
                    && component_of.get(&edge.parent_data) == Some(&c)
                {
                    self.deferred.push(i);
                }
            }
        }
        self.cycles
            .sort_by_cached_key(|members| catalog.table(members[0]).qualified());
        self.deferred.sort_unstable();
    }

    fn compute_constraints(&mut self, catalog: &Catalog, plan: &SamplingPlan, graph: &DependencyGraph) {
        let deferred: AHashSet<(TableId, usize)> = self
            .deferred
            .iter()
            .map(|&i| (graph.edges[i].child, graph.edges[i].constraint))
            .collect();
        let mut late = Vec::new();

        for &id in &self.tables {
            let table = catalog.table(id);
            let dropped = plan
                .table_plan(id)
                .map(|p| p.dropped_foreign_keys.as_slice())
                .unwrap_or(&[]);

            for (pos, constraint) in table.constraints.iter().enumerate() {
                if constraint.is_key() {
                    self.key_constraints.push((id, pos));
                }
            }
            for pos in 0..table.indexes.len() {
                self.indexes.push((id, pos));
            }
            for (pos, _, fk) in table.foreign_keys() {
                if dropped.contains(&pos) || !fk.referenced.is_some_and(|p| plan.is_kept(p)) {
                    continue;
                }
                if deferred.contains(&(id, pos)) {
                    late.push((id, pos));
                } else {
                    self.foreign_keys.push((id, pos));
                }
            }
        }
        self.foreign_keys.extend(late);
    }

    fn compute_views(&mut self, catalog: &Catalog, plan: &SamplingPlan) {
        let view_index: AHashMap<&QualifiedName, usize> = catalog
            .views
            .iter()
            .enumerate()
            .map(|(i, v)| (&v.name, i))
            .collect();

        // A view survives only if everything it reads survives
        let mut alive: Vec<bool> = catalog
            .views
            .iter()
            .map(|v| {
                v.depends_on.iter().all(|dep| match catalog.table_id(dep) {
                    Some(id) => plan.is_kept(id),
                    None => view_index.contains_key(dep),
                })
            })
            .collect();
        loop {
            let mut changed = false;
            for (i, view) in catalog.views.iter().enumerate() {
                if alive[i]
                    && view
                        .depends_on
                        .iter()
                        .any(|dep| view_index.get(dep).is_some_and(|&j| !alive[j]))
                {
                    alive[i] = false;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        for (i, view) in catalog.views.iter().enumerate() {
            if !alive[i] {
                self.warnings.push(format!(
                    "{} {} is skipped because it reads an excluded relation",
                    if view.materialized { "materialized view" } else { "view" },
                    view.name
                ));
            }
        }

        let mut waiting_on: Vec<usize> = vec![0; catalog.views.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); catalog.views.len()];
        for (i, view) in catalog.views.iter().enumerate() {
            if !alive[i] {
                continue;
            }
            for dep in &view.depends_on {
                if let Some(&j) = view_index.get(dep) {
                    waiting_on[i] += 1;
                    dependents[j].push(i);
                }
            }
        }

        let key = |i: usize| (catalog.views[i].materialized, catalog.views[i].name.clone());
        let mut ready: BinaryHeap<Reverse<((bool, QualifiedName), usize)>> = (0..catalog.views.len())
            .filter(|&i| alive[i] && waiting_on[i] == 0)
            .map(|i| Reverse((key(i), i)))
            .collect();

        while let Some(Reverse((_, i))) = ready.pop() {
            self.views.push(i);
            for &d in &dependents[i] {
                waiting_on[d] -= 1;
                if waiting_on[d] == 0 {
                    ready.push(Reverse((key(d), d)));
                }
            }
        }

        let emitted = self.views.len();
        let expected = alive.iter().filter(|a| **a).count();
        if emitted < expected {
            self.warnings.push(format!(
                "{} view(s) depend on each other cyclically and are skipped",
                expected - emitted
            ));
        }
    }

    /// True when the constraint is a foreign key inside a cycle
    pub fn is_deferred(&self, graph: &DependencyGraph, table: TableId, constraint: usize) -> bool {
        self.deferred
            .iter()
            .any(|&i| graph.edges[i].child == table && graph.edges[i].constraint == constraint)
    }
}

fn partition_depth(catalog: &Catalog, mut id: TableId) -> usize {
    let mut depth = 0;
    while let Partitioning::Child {
        parent: Some(parent),
        ..
    } = &catalog.table(id).partitioning
    {
        depth += 1;
        id = *parent;
        if depth > catalog.len() {
            break;
        }
    }
    depth
}

/// Types used by kept tables or living in their schemas, dependencies first.
fn type_order(
    catalog: &Catalog,
    tables: &[TableId],
    table_schemas: &AHashSet<&str>,
) -> Result<Vec<usize>> {
    let index: AHashMap<&QualifiedName, usize> = catalog
        .types
        .iter()
        .enumerate()
        .filter(|(_, t)| {
            // a table's row type is created with the table
            !(matches!(t.kind, TypeKind::Composite { .. }) && catalog.table_id(&t.name).is_some())
        })
        .map(|(i, t)| (&t.name, i))
        .collect();

    let mut wanted: Vec<bool> = vec![false; catalog.types.len()];
    let mut stack: Vec<usize> = Vec::new();
    for (&name, &i) in &index {
        if table_schemas.contains(name.schema.as_str()) {
            stack.push(i);
        }
    }
    for &id in tables {
        for column in &catalog.table(id).columns {
            if let Some(&i) = column.type_ref.as_ref().and_then(|t| index.get(t)) {
                stack.push(i);
            }
        }
    }
    while let Some(i) = stack.pop() {
        if std::mem::replace(&mut wanted[i], true) {
            continue;
        }
        for dep in &catalog.types[i].depends_on {
            if let Some(&j) = index.get(dep) {
                stack.push(j);
            }
        }
    }

    let mut waiting_on = vec![0usize; catalog.types.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); catalog.types.len()];
    for (i, type_def) in catalog.types.iter().enumerate() {
        if !wanted[i] {
            continue;
        }
        for dep in &type_def.depends_on {
            if let Some(&j) = index.get(dep) {
                waiting_on[i] += 1;
                dependents[j].push(i);
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<(QualifiedName, usize)>> = (0..catalog.types.len())
        .filter(|&i| wanted[i] && waiting_on[i] == 0)
        .map(|i| Reverse((catalog.types[i].name.clone(), i)))
        .collect();
    let mut order = Vec::new();
    while let Some(Reverse((_, i))) = ready.pop() {
        order.push(i);
        for &d in &dependents[i] {
            waiting_on[d] -= 1;
            if waiting_on[d] == 0 {
                ready.push(Reverse((catalog.types[d].name.clone(), d)));
            }
        }
    }

    if let Some(i) = (0..catalog.types.len()).find(|&i| wanted[i] && !order.contains(&i)) {
        return Err(SampleError::structural(
            catalog.types[i].name.to_string(),
            "user-defined types depend on each other cyclically",
        ));
    }
    Ok(order)
}

/// Sequences feeding kept tables, plus free-standing sequences in their
/// schemas.
fn sequence_order(catalog: &Catalog, plan: &SamplingPlan, table_schemas: &AHashSet<&str>) -> Vec<usize> {
    let kept = |name: &QualifiedName| catalog.table_id(name).is_some_and(|id| plan.is_kept(id));

    let mut order: Vec<usize> = catalog
        .sequences
        .iter()
        .enumerate()
        .filter(|(_, s)| {
            let attached = s.bindings.iter().map(|(t, _)| t).chain(s.owned_by.iter().map(|(t, _)| t));
            let mut attached = attached.peekable();
            if attached.peek().is_none() {
                table_schemas.contains(s.name.schema.as_str())
            } else {
                attached.any(kept)
            }
        })
        .map(|(i, _)| i)
        .collect();
    order.sort_by(|&a, &b| catalog.sequences[a].name.cmp(&catalog.sequences[b].name));
    order
}
