//! Class metadata for the built-in managed types, so handles to lists, sets
//! and boxed scalars can be driven by member name like any user class.

use crate::error::{BridgeError, BridgeResult};
use crate::managed::{ManagedList, ManagedSet, ManagedType, Object};
use crate::registry::{ClassDescriptor, MethodDescriptor, TypeRegistry};

fn any() -> ManagedType {
    ManagedType::Any
}

fn any_array() -> ManagedType {
    ManagedType::array(ManagedType::Any)
}

fn this<'a>(receiver: Option<&'a Object>) -> BridgeResult<&'a Object> {
    receiver.ok_or_else(|| BridgeError::invocation("instance method called without a receiver"))
}

fn this_list(receiver: Option<&Object>) -> BridgeResult<&ManagedList> {
    let obj = this(receiver)?;
    obj.as_list()
        .ok_or_else(|| BridgeError::invocation(format!("{} is not a list", obj.managed_type())))
}

fn this_set(receiver: Option<&Object>) -> BridgeResult<&ManagedSet> {
    let obj = this(receiver)?;
    obj.as_set()
        .ok_or_else(|| BridgeError::invocation(format!("{} is not a set", obj.managed_type())))
}

fn items_of(arg: &Object) -> Vec<Object> {
    arg.as_array().map(<[Object]>::to_vec).unwrap_or_default()
}

fn render(items: &[Object]) -> String {
    let parts: Vec<String> = items.iter().map(Object::describe).collect();
    format!("[{}]", parts.join(", "))
}

fn int_result(n: usize) -> BridgeResult<Object> {
    i32::try_from(n)
        .map(Object::int)
        .map_err(|_| BridgeError::invocation(format!("{n} does not fit in an int")))
}

fn list_class() -> ClassDescriptor {
    ClassDescriptor::builder(ManagedType::list(any()))
        .alias("ArrayList")
        .constructor(MethodDescriptor::constructor(vec![], |_, _| {
            Ok(Object::list(any(), Vec::new()))
        }))
        .constructor(MethodDescriptor::constructor(vec![any_array()], |_, args| {
            Ok(Object::list(any(), items_of(&args[0])))
        }))
        .constructor(
            MethodDescriptor::constructor(vec![any_array()], |_, args| {
                Ok(Object::list(any(), items_of(&args[0])))
            })
            .variadic(),
        )
        .method(MethodDescriptor::instance("size", vec![], ManagedType::Int, |recv, _| {
            int_result(this_list(recv)?.len())
        }))
        .method(MethodDescriptor::instance("isEmpty", vec![], ManagedType::Bool, |recv, _| {
            Ok(Object::bool(this_list(recv)?.is_empty()))
        }))
        .method(MethodDescriptor::instance(
            "get",
            vec![ManagedType::Int],
            any(),
            |recv, args| {
                let list = this_list(recv)?;
                let idx = args[0].as_i32().unwrap_or(-1);
                usize::try_from(idx)
                    .ok()
                    .and_then(|i| list.get(i))
                    .ok_or_else(|| {
                        BridgeError::invocation(format!(
                            "index {idx} out of bounds for length {}",
                            list.len()
                        ))
                    })
            },
        ))
        .method(MethodDescriptor::instance("add", vec![any()], ManagedType::Bool, |recv, args| {
            this_list(recv)?.push(args[0].clone());
            Ok(Object::bool(true))
        }))
        .method(MethodDescriptor::instance(
            "contains",
            vec![any()],
            ManagedType::Bool,
            |recv, args| Ok(Object::bool(this_list(recv)?.contains(&args[0]))),
        ))
        .method(MethodDescriptor::instance("toArray", vec![], any_array(), |recv, _| {
            Ok(Object::array(any(), this_list(recv)?.snapshot()))
        }))
        .method(MethodDescriptor::instance("toString", vec![], ManagedType::Text, |recv, _| {
            Ok(Object::text(render(&this_list(recv)?.snapshot())))
        }))
        .build()
}

fn set_class() -> ClassDescriptor {
    ClassDescriptor::builder(ManagedType::set(any()))
        .alias("LinkedHashSet")
        .constructor(MethodDescriptor::constructor(vec![], |_, _| {
            Ok(Object::set(any(), Vec::new()))
        }))
        .constructor(MethodDescriptor::constructor(vec![any_array()], |_, args| {
            Ok(Object::set(any(), items_of(&args[0])))
        }))
        .constructor(
            MethodDescriptor::constructor(vec![any_array()], |_, args| {
                Ok(Object::set(any(), items_of(&args[0])))
            })
            .variadic(),
        )
        .method(MethodDescriptor::instance("size", vec![], ManagedType::Int, |recv, _| {
            int_result(this_set(recv)?.len())
        }))
        .method(MethodDescriptor::instance("isEmpty", vec![], ManagedType::Bool, |recv, _| {
            Ok(Object::bool(this_set(recv)?.is_empty()))
        }))
        .method(MethodDescriptor::instance("add", vec![any()], ManagedType::Bool, |recv, args| {
            Ok(Object::bool(this_set(recv)?.insert(args[0].clone())))
        }))
        .method(MethodDescriptor::instance(
            "contains",
            vec![any()],
            ManagedType::Bool,
            |recv, args| Ok(Object::bool(this_set(recv)?.contains(&args[0]))),
        ))
        .method(MethodDescriptor::instance("toArray", vec![], any_array(), |recv, _| {
            Ok(Object::array(any(), this_set(recv)?.snapshot()))
        }))
        .method(MethodDescriptor::instance("toString", vec![], ManagedType::Text, |recv, _| {
            Ok(Object::text(render(&this_set(recv)?.snapshot())))
        }))
        .build()
}

fn string_class() -> ClassDescriptor {
    ClassDescriptor::builder(ManagedType::Text)
        .constructor(MethodDescriptor::constructor(vec![ManagedType::Text], |_, args| {
            Ok(Object::text(args[0].as_str().unwrap_or_default()))
        }))
        .method(MethodDescriptor::instance("length", vec![], ManagedType::Int, |recv, _| {
            int_result(this(recv)?.as_str().map_or(0, |s| s.chars().count()))
        }))
        .method(MethodDescriptor::instance("isEmpty", vec![], ManagedType::Bool, |recv, _| {
            Ok(Object::bool(this(recv)?.as_str().is_none_or(str::is_empty)))
        }))
        .method(MethodDescriptor::instance("toString", vec![], ManagedType::Text, |recv, _| {
            let obj = this(recv)?;
            Ok(Object::text(obj.as_str().unwrap_or_default()))
        }))
        .build()
}

fn double_class() -> ClassDescriptor {
    ClassDescriptor::builder(ManagedType::Double)
        .constructor(MethodDescriptor::constructor(vec![ManagedType::Double], |_, args| {
            Ok(Object::double(args[0].as_f64().unwrap_or_default()))
        }))
        .method(MethodDescriptor::instance("doubleValue", vec![], ManagedType::Double, |recv, _| {
            Ok(Object::double(this(recv)?.as_f64().unwrap_or_default()))
        }))
        .method(MethodDescriptor::instance("toString", vec![], ManagedType::Text, |recv, _| {
            Ok(Object::text(this(recv)?.describe()))
        }))
        .build()
}

/// Register List, Set, String and Double.
pub fn install(registry: &mut TypeRegistry) {
    registry.register(list_class());
    registry.register(set_class());
    registry.register(string_class());
    registry.register(double_class());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collections_resolve_by_alias() {
        let mut reg = TypeRegistry::new();
        install(&mut reg);
        assert_eq!(reg.lookup("ArrayList").unwrap().name(), "List");
        assert_eq!(reg.lookup("LinkedHashSet").unwrap().name(), "Set");
        assert_eq!(reg.lookup("List").unwrap().constructors().len(), 3);
    }

    #[test]
    fn list_methods_work_on_any_element_type() {
        let mut reg = TypeRegistry::new();
        install(&mut reg);
        let list = Object::list(ManagedType::Int, vec![Object::int(4)]);
        let add = &reg.methods_named(list.managed_type(), "add")[0];
        add.call(Some(&list), &[Object::int(5)]).unwrap();
        let size = &reg.methods_named(list.managed_type(), "size")[0];
        assert_eq!(size.call(Some(&list), &[]).unwrap().as_i32(), Some(2));
        let get = &reg.methods_named(list.managed_type(), "get")[0];
        assert_eq!(get.call(Some(&list), &[Object::int(1)]).unwrap().as_i32(), Some(5));
        assert!(get.call(Some(&list), &[Object::int(9)]).is_err());
        let to_string = &reg.methods_named(list.managed_type(), "toString")[0];
        assert_eq!(to_string.call(Some(&list), &[]).unwrap().as_str(), Some("[4, 5]"));
    }
}
