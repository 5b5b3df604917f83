// SPDX-License-Identifier: MIT OR Apache-2.0
//! The validated task graph and its building-block algorithms.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;
use sykli_capability::{self as capability, Consumer, Provider};

use crate::error::CoreError;
use crate::resource::Resource;
use crate::task::Task;

#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    tasks: BTreeMap<String, Task>,
    resources: BTreeMap<String, Resource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl Graph {
    pub fn new(tasks: BTreeMap<String, Task>, resources: BTreeMap<String, Resource>) -> Self {
        Self { tasks, resources }
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    pub fn tasks(&self) -> &BTreeMap<String, Task> {
        &self.tasks
    }

    pub fn resources(&self) -> &BTreeMap<String, Resource> {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run the full build pipeline: matrix expansion, capability resolution,
    /// cycle check, artifact validation. Returns the validated graph plus
    /// its scheduling levels.
    pub fn build(self) -> Result<(Graph, Vec<Vec<String>>), CoreError> {
        let graph = self.expand_matrix();
        let graph = graph.resolve_capabilities()?;
        let levels = graph.topological_sort()?;
        graph.validate_artifacts()?;
        Ok((graph, levels))
    }

    /// Replace every task declaring a non-empty `matrix` with its Cartesian
    /// product of variants, and fan out any `depends_on` edges that name a
    /// base task out to all of its variants.
    ///
    /// Dimensions are walked in the order the task declared them, so
    /// `{os: [linux, mac], arch: [x86, arm]}` yields `t-linux-x86` before
    /// `t-linux-arm`, `t-mac-x86`, `t-mac-arm`.
    pub fn expand_matrix(mut self) -> Graph {
        let base_names: Vec<String> = self
            .tasks
            .iter()
            .filter(|(_, t)| !t.matrix.is_empty())
            .map(|(name, _)| name.clone())
            .collect();

        if base_names.is_empty() {
            return self;
        }

        let mut variants_of: HashMap<String, Vec<String>> = HashMap::new();
        let mut new_tasks: BTreeMap<String, Task> = BTreeMap::new();

        for base_name in &base_names {
            let base = self.tasks.remove(base_name).expect("base task present");
            let combos = cartesian_product(&base.matrix);
            let mut names = Vec::with_capacity(combos.len());
            for combo in combos {
                let suffix: Vec<String> = combo.values().cloned().collect();
                let variant_name = format!("{base_name}-{}", suffix.join("-"));
                let mut variant = base.clone();
                variant.name = variant_name.clone();
                variant.matrix_values = combo;
                variant.matrix = IndexMap::new();
                names.push(variant_name.clone());
                new_tasks.insert(variant_name, variant);
            }
            variants_of.insert(base_name.clone(), names);
        }

        for task in self.tasks.values_mut() {
            fan_out_depends_on(task, &variants_of);
        }
        for task in new_tasks.values_mut() {
            fan_out_depends_on(task, &variants_of);
        }

        self.tasks.extend(new_tasks);
        self
    }

    /// Resolve `capability.provides`/`needs` into implicit dependencies and
    /// `SYKLI_CAP_<NAME>` environment injections.
    pub fn resolve_capabilities(mut self) -> Result<Graph, CoreError> {
        let providers: Vec<Provider<'_>> = self
            .tasks
            .iter()
            .flat_map(|(name, task)| {
                let is_matrix = task.is_matrix_variant();
                task.capability
                    .iter()
                    .flat_map(move |cap| cap.provides.iter())
                    .map(move |p| Provider {
                        task: name.as_str(),
                        name: p.name.as_str(),
                        value: p.value.as_deref(),
                        is_matrix,
                    })
            })
            .collect();

        let needs_by_task: BTreeMap<String, Vec<String>> = self
            .tasks
            .iter()
            .map(|(name, task)| {
                let needs = task
                    .capability
                    .as_ref()
                    .map(|c| c.needs.clone())
                    .unwrap_or_default();
                (name.clone(), needs)
            })
            .collect();
        let consumers: Vec<Consumer<'_>> = needs_by_task
            .iter()
            .map(|(name, needs)| Consumer {
                task: name.as_str(),
                needs,
            })
            .collect();

        let plan = capability::resolve(&providers, &consumers)?;

        for (consumer, provider) in plan.implicit_edges {
            if let Some(task) = self.tasks.get_mut(&consumer) {
                task.depends_on.insert(provider);
            }
        }
        for (consumer, var_name, value) in plan.env_injections {
            if let Some(task) = self.tasks.get_mut(&consumer) {
                task.env.insert(var_name, value);
            }
        }

        Ok(self)
    }

    /// 3-color DFS cycle detection plus longest-path leveling.
    pub fn topological_sort(&self) -> Result<Vec<Vec<String>>, CoreError> {
        self.check_unknown_dependencies()?;
        self.check_cycles()?;

        let mut depth: HashMap<String, usize> = HashMap::new();
        let mut in_progress: HashSet<String> = HashSet::new();
        for name in self.tasks.keys() {
            self.compute_depth(name, &mut depth, &mut in_progress);
        }

        let mut levels: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for (name, d) in &depth {
            levels.entry(*d).or_default().push(name.clone());
        }
        for level in levels.values_mut() {
            level.sort();
        }
        Ok(levels.into_values().collect())
    }

    fn compute_depth(
        &self,
        name: &str,
        depth: &mut HashMap<String, usize>,
        in_progress: &mut HashSet<String>,
    ) -> usize {
        if let Some(d) = depth.get(name) {
            return *d;
        }
        in_progress.insert(name.to_string());
        let task = match self.tasks.get(name) {
            Some(t) => t,
            None => return 0,
        };
        let mut max_pred_depth: Option<usize> = None;
        for pred in &task.depends_on {
            let pred_depth = self.compute_depth(pred, depth, in_progress);
            max_pred_depth = Some(max_pred_depth.map_or(pred_depth, |m| m.max(pred_depth)));
        }
        let d = max_pred_depth.map_or(0, |m| m + 1);
        depth.insert(name.to_string(), d);
        d
    }

    fn check_unknown_dependencies(&self) -> Result<(), CoreError> {
        for (name, task) in &self.tasks {
            for dep in &task.depends_on {
                if !self.tasks.contains_key(dep) {
                    return Err(CoreError::UnknownDependency {
                        task: name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_cycles(&self) -> Result<(), CoreError> {
        let mut colors: HashMap<&str, Color> = self
            .tasks
            .keys()
            .map(|name| (name.as_str(), Color::White))
            .collect();
        let mut stack: Vec<String> = Vec::new();

        for name in self.tasks.keys() {
            if colors.get(name.as_str()) == Some(&Color::White) {
                self.visit_for_cycle(name, &mut colors, &mut stack)?;
            }
        }
        Ok(())
    }

    fn visit_for_cycle<'a>(
        &'a self,
        name: &'a str,
        colors: &mut HashMap<&'a str, Color>,
        stack: &mut Vec<String>,
    ) -> Result<(), CoreError> {
        colors.insert(name, Color::Gray);
        stack.push(name.to_string());

        if let Some(task) = self.tasks.get(name) {
            for dep in &task.depends_on {
                match colors.get(dep.as_str()) {
                    Some(Color::Gray) => {
                        let mut path = stack.clone();
                        path.push(dep.clone());
                        let start = path.iter().position(|n| n == dep).unwrap_or(0);
                        return Err(CoreError::Cycle {
                            path: path[start..].to_vec(),
                        });
                    }
                    Some(Color::Black) => {}
                    _ => self.visit_for_cycle(dep.as_str(), colors, stack)?,
                }
            }
        }

        stack.pop();
        colors.insert(name, Color::Black);
        Ok(())
    }

    /// For every `task_inputs` entry: the producer must exist, declare the
    /// named output, and be a transitive predecessor of the consumer.
    pub fn validate_artifacts(&self) -> Result<(), CoreError> {
        for (name, task) in &self.tasks {
            for input_ref in &task.task_inputs {
                let producer = self.tasks.get(&input_ref.from_task).ok_or_else(|| {
                    CoreError::UnknownArtifactProducer {
                        consumer: name.clone(),
                        producer: input_ref.from_task.clone(),
                    }
                })?;
                if !producer.outputs.contains_key(&input_ref.output_name) {
                    return Err(CoreError::UnknownArtifactOutput {
                        consumer: name.clone(),
                        producer: input_ref.from_task.clone(),
                        output: input_ref.output_name.clone(),
                    });
                }
                if !self.is_transitive_predecessor(&input_ref.from_task, name) {
                    return Err(CoreError::ArtifactProducerNotPredecessor {
                        consumer: name.clone(),
                        producer: input_ref.from_task.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn is_transitive_predecessor(&self, candidate: &str, consumer: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![consumer];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(task) = self.tasks.get(current) else {
                continue;
            };
            for pred in &task.depends_on {
                if pred == candidate {
                    return true;
                }
                stack.push(pred.as_str());
            }
        }
        false
    }
}

fn fan_out_depends_on(task: &mut Task, variants_of: &HashMap<String, Vec<String>>) {
    let mut new_deps: BTreeSet<String> = BTreeSet::new();
    for dep in &task.depends_on {
        match variants_of.get(dep) {
            Some(variants) => new_deps.extend(variants.iter().cloned()),
            None => {
                new_deps.insert(dep.clone());
            }
        }
    }
    task.depends_on = new_deps;
}

fn cartesian_product(matrix: &IndexMap<String, Vec<String>>) -> Vec<IndexMap<String, String>> {
    let mut combos: Vec<IndexMap<String, String>> = vec![IndexMap::new()];
    for (key, values) in matrix {
        let mut next = Vec::with_capacity(combos.len() * values.len().max(1));
        for combo in &combos {
            for value in values {
                let mut extended = combo.clone();
                extended.insert(key.clone(), value.clone());
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}
