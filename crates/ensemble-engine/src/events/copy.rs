//! Copy: duplicate a block, port values included.

use super::{delta, describe, object_path, put, Outcome, PreContext};
use ensemble_core::{uris, Context, Properties, Uri};
use ensemble_protocol::{Message, Status};

pub(super) fn copy(ctx: &mut PreContext<'_>, from: &Uri, to: &Uri) -> Outcome {
    let from = object_path(from)?;
    let to_path = object_path(to)?;
    let source = ctx.store.get(&from).ok_or(Status::NotFound)?;
    if source.as_block().is_none() {
        return Err(Status::BadObjectType);
    }
    if ctx.store.contains(&to_path) {
        return Err(Status::Exists);
    }
    let parent = to_path.parent().ok_or(Status::BadUri)?;
    match ctx.store.get(&parent) {
        None => return Err(Status::ParentNotFound),
        Some(object) if !object.is_graph() => return Err(Status::InvalidParent),
        Some(_) => {}
    }

    let block_props = source.properties.clone();
    let port_values: Vec<(String, Properties)> = ctx
        .store
        .children(&from)
        .filter(|(_, object)| object.as_port().is_some())
        .map(|(p, object)| {
            let values = object
                .properties
                .iter()
                .filter(|(key, _)| !matches!(key.as_str(), uris::TYPE | uris::INDEX | uris::SYMBOL))
                .map(|(key, prop)| (key.clone(), prop.clone()))
                .collect();
            (p.symbol().to_string(), values)
        })
        .collect();

    let mut prepared = put::put(ctx, to, &block_props, Context::Default)?;
    for (symbol, values) in port_values {
        let Some(port) = to_path.child(&symbol) else {
            continue;
        };
        if values.is_empty() || !ctx.store.contains(&port) {
            continue;
        }
        match delta::set_keys(ctx, &port, &values, Context::Default) {
            Ok(edit) => prepared.plan.extend(edit.plan),
            Err(status) => {
                ctx.store.remove_subtree(&to_path);
                return Err(status);
            }
        }
    }

    prepared.broadcast = describe(ctx.store, &to_path);
    prepared.inverse = vec![Message::Del {
        seq: 0,
        uri: to.clone(),
    }];
    Ok(prepared)
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use ensemble_core::Atom;

    fn cp(from: &str, to: &str) -> Message {
        Message::Copy {
            seq: 1,
            from: Uri::from(from),
            to: Uri::from(to),
        }
    }

    #[test]
    fn test_copy_duplicates_block_with_values() {
        let mut fx = Fixture::new();
        fx.run(&put_block("/amp", GAIN)).unwrap();
        fx.run(&set("/amp/gain", uris::VALUE, Atom::float(0.5))).unwrap();

        let prepared = fx.run(&cp("/amp", "/amp2")).unwrap();
        assert_eq!(fx.props("/amp2").get(uris::PROTOTYPE), Some(&Atom::uri(GAIN)));
        assert_eq!(fx.props("/amp2/gain").get(uris::VALUE), Some(&Atom::float(0.5)));
        assert_eq!(fx.store.port(&path("/amp2/gain")).unwrap().runtime.value(), 0.5);
        // the copy gets its own instance
        let a = fx.store.block(&path("/amp")).unwrap().runtime.clone();
        let b = fx.store.block(&path("/amp2")).unwrap().runtime.clone();
        assert!(!std::sync::Arc::ptr_eq(&a, &b));

        fx.replay(&prepared.inverse);
        assert!(!fx.store.contains(&path("/amp2")));
    }

    #[test]
    fn test_copy_errors() {
        let mut fx = Fixture::new();
        fx.run(&put_graph("/g")).unwrap();
        fx.run(&put_block("/amp", GAIN)).unwrap();

        assert_eq!(fx.apply(&cp("/nope", "/x")).unwrap_err(), Status::NotFound);
        assert_eq!(fx.apply(&cp("/g", "/g2")).unwrap_err(), Status::BadObjectType);
        assert_eq!(fx.apply(&cp("/amp", "/g")).unwrap_err(), Status::Exists);
        assert_eq!(fx.apply(&cp("/amp", "/missing/amp")).unwrap_err(), Status::ParentNotFound);
        assert_eq!(fx.apply(&cp("/amp", "/amp/copy")).unwrap_err(), Status::InvalidParent);

        fx.run(&cp("/amp", "/g/amp")).unwrap();
        assert!(fx.store.block(&path("/g/amp")).is_some());
    }

    #[test]
    fn test_rejected_port_value_removes_the_copy() {
        let mut fx = Fixture::new();
        fx.run(&put_block("/amp", GAIN)).unwrap();
        // a value no edit could have stored
        fx.store
            .get_mut(&path("/amp/gain"))
            .unwrap()
            .properties
            .set(uris::VALUE, Atom::string("loud"));
        let before = fx.store.snapshot();

        assert_eq!(fx.apply(&cp("/amp", "/amp2")).unwrap_err(), Status::BadValueType);
        assert!(!fx.store.contains(&path("/amp2")));
        assert!(!fx.store.contains(&path("/amp2/gain")));
        assert_eq!(fx.store.snapshot(), before);
    }
}
