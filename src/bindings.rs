//! Finding the node bound to a model path.

use crate::arena::ComponentId;
use crate::dom::NodeId;

fn bound_to(root: NodeId, model: &str) -> Option<NodeId> {
    std::iter::once(root)
        .chain(root.descendants())
        .find(|node| node.attr("bind").is_some_and(|path| path.trim() == model))
}

/// Split `contacts[1].name` into `("contacts", 1, "name")`.
fn split_indexed(path: &str) -> Option<(&str, usize, &str)> {
    let open = path.find('[')?;
    let close = open + path[open..].find(']')?;
    let index = path[open + 1..close].trim().parse().ok()?;
    let rest = path[close + 1..].trim_start_matches('.');
    Some((path[..open].trim(), index, rest))
}

/// The node whose `bind` attribute targets `path`.
///
/// A plain path is looked up in the component's subtree. An indexed path
/// (`contacts[1].name`) is looked up in the matching instance of the repeat
/// over `contacts` placed in this component or one of its ancestors, first
/// as `bind="contact.name"` (the repeat's item name) and then as
/// `bind="name"`. With nothing after the index the instance's first element
/// is returned.
pub(crate) fn find_binding(component: ComponentId, path: &str) -> Option<NodeId> {
    let path = path.trim();
    let Some((source, index, rest)) = split_indexed(path) else {
        return bound_to(component.node()?, path);
    };

    let mut current = Some(component);
    while let Some(owner) = current {
        let found = owner.with(|meta| {
            meta.repeats.iter().find(|repeat| repeat.source == source).map(|repeat| {
                let starts = repeat.starts.borrow();
                let stop = starts.get(index + 1).copied().unwrap_or(repeat.end);
                let nodes = starts.get(index).map(|first| first.siblings_until(stop));
                (repeat.item_name.clone(), nodes)
            })
        });
        if let Some(Some((item_name, nodes))) = found {
            let nodes = nodes?;
            if rest.is_empty() {
                return nodes.into_iter().find(|node| node.is_element());
            }
            let item_path = format!("{item_name}.{rest}");
            return nodes
                .iter()
                .find_map(|node| bound_to(*node, &item_path))
                .or_else(|| nodes.iter().find_map(|node| bound_to(*node, rest)));
        }
        current = owner.parent();
    }
    None
}
