use std::collections::{BTreeMap, BTreeSet, HashSet};

use anyhow::{anyhow, Result};

use crate::Actor;

pub(crate) fn topo_order(actors: &BTreeMap<String, &dyn Actor>) -> Result<Vec<String>> {
    let mut producers: BTreeMap<&'static str, BTreeSet<String>> = BTreeMap::new();
    for (name, actor) in actors {
        for model in actor.produces() {
            producers.entry(model).or_default().insert(name.clone());
        }
    }

    let mut deps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut reverse: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for name in actors.keys() {
        deps.insert(name.clone(), BTreeSet::new());
        reverse.insert(name.clone(), BTreeSet::new());
    }

    for (name, actor) in actors {
        for model in actor.consumes() {
            let Some(sources) = producers.get(model) else {
                continue;
            };
            for producer in sources.iter().filter(|producer| *producer != name) {
                deps.entry(name.clone())
                    .or_default()
                    .insert(producer.clone());
                reverse
                    .entry(producer.clone())
                    .or_default()
                    .insert(name.clone());
            }
        }
    }

    let mut in_degree: BTreeMap<String, usize> = deps
        .iter()
        .map(|(name, producers)| (name.clone(), producers.len()))
        .collect();
    let mut ready: BTreeSet<String> = in_degree
        .iter()
        .filter_map(|(name, degree)| (*degree == 0).then_some(name.clone()))
        .collect();
    let mut ordered = Vec::new();

    while let Some(next) = ready.pop_first() {
        ordered.push(next.clone());
        if let Some(children) = reverse.get(&next) {
            for child in children {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert(child.clone());
                    }
                }
            }
        }
    }

    if ordered.len() != actors.len() {
        let ordered_set: HashSet<&str> = ordered.iter().map(String::as_str).collect();
        let cycle_nodes = actors
            .keys()
            .filter(|name| !ordered_set.contains(name.as_str()))
            .cloned()
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "message cycle between actors: {}",
            cycle_nodes.join(", ")
        ));
    }

    Ok(ordered)
}
