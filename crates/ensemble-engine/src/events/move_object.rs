//! Move: rename an object within its parent.

use super::{Outcome, PreContext, Prepared};
use ensemble_core::{uris, Atom, Path};
use ensemble_protocol::{Message, Status};
use std::collections::BTreeSet;

pub(super) fn move_object(ctx: &mut PreContext<'_>, from: &Path, to: &Path) -> Outcome {
    if from.is_root() || to.is_root() {
        return Err(Status::NotMovable);
    }
    let object = ctx.store.get(from).ok_or(Status::NotFound)?;
    if object.is_block_port() {
        return Err(Status::NotMovable);
    }
    let parent = from.parent().ok_or(Status::NotMovable)?;
    if to.parent().as_ref() != Some(&parent) {
        return Err(Status::ParentDiffers);
    }
    if ctx.store.contains(to) {
        return Err(Status::Exists);
    }

    ctx.store.move_subtree(from, to);
    if let Some(object) = ctx.store.get_mut(to) {
        if object.as_port().is_some() {
            object.properties.set(uris::SYMBOL, Atom::string(to.symbol()));
        }
    }

    let mut dirty: BTreeSet<Path> = ctx
        .store
        .subtree(to)
        .filter(|(_, object)| object.is_graph())
        .map(|(p, _)| p.clone())
        .collect();
    dirty.extend(ctx.store.arcs_touching(to).into_iter().map(|(_, _, graph)| graph));
    dirty.insert(parent);

    let mut prepared = Prepared::default();
    for graph in &dirty {
        prepared.plan.push(ctx.recompile(graph)?);
    }
    prepared.broadcast.push(Message::Move {
        seq: 0,
        from: from.clone(),
        to: to.clone(),
    });
    prepared.inverse.push(Message::Move {
        seq: 0,
        from: to.clone(),
        to: from.clone(),
    });
    tracing::debug!(%from, %to, "moved");
    Ok(prepared)
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    fn mv(from: &str, to: &str) -> Message {
        Message::Move {
            seq: 1,
            from: path(from),
            to: path(to),
        }
    }

    #[test]
    fn test_move_rejections() {
        let mut fx = Fixture::new();
        fx.run(&put_graph("/g")).unwrap();
        fx.run(&put_block("/amp", GAIN)).unwrap();
        fx.run(&put_block("/amp2", GAIN)).unwrap();

        assert_eq!(fx.apply(&mv("/", "/x")).unwrap_err(), Status::NotMovable);
        assert_eq!(fx.apply(&mv("/amp/in", "/amp/input")).unwrap_err(), Status::NotMovable);
        assert_eq!(fx.apply(&mv("/nope", "/x")).unwrap_err(), Status::NotFound);
        assert_eq!(fx.apply(&mv("/amp", "/g/amp")).unwrap_err(), Status::ParentDiffers);
        assert_eq!(fx.apply(&mv("/amp", "/amp2")).unwrap_err(), Status::Exists);
    }

    #[test]
    fn test_move_carries_arcs_and_undoes() {
        let mut fx = Fixture::new();
        fx.run(&put_block("/src", SOURCE)).unwrap();
        fx.run(&put_block("/amp", GAIN)).unwrap();
        fx.run(&connect("/src/out", "/amp/in")).unwrap();
        let before = fx.store.snapshot();

        let prepared = fx.run(&mv("/amp", "/gain")).unwrap();
        assert!(fx.store.has_arc(&path("/src/out"), &path("/gain/in")));
        assert!(fx.store.port(&path("/gain/out")).is_some());
        let root = fx.store.graph(&Path::root()).unwrap().runtime.clone();
        assert_eq!(root.compiled().unwrap().order(), ["/src", "/gain"]);

        fx.replay(&prepared.inverse);
        assert_eq!(fx.store.snapshot(), before);
    }

    #[test]
    fn test_moved_graph_port_takes_new_symbol() {
        let mut fx = Fixture::new();
        fx.run(&put_port("/in", uris::INPUT_PORT, uris::AUDIO_PORT)).unwrap();
        fx.run(&mv("/in", "/left")).unwrap();
        assert_eq!(fx.props("/left").get(uris::SYMBOL), Some(&Atom::string("left")));
    }
}
