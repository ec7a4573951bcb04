use super::*;
use crate::testing::{ModuleTree, call0};

#[test]
fn test_main_module_registered() {
    let tree = ModuleTree::new();
    let rt = tree.runtime();
    let main = rt.module(MAIN_MODULE).unwrap();
    assert_eq!(main, rt.main_module());
    assert_eq!(rt.heap().module(main).unwrap().path, None);
}

#[test]
fn test_import_is_cached() {
    let mut tree = ModuleTree::new();
    tree.write("a", "[values]\nX = 1\n");
    let mut rt = tree.runtime();

    let first = rt.import_module("a").unwrap();
    let second = rt.import_module("a").unwrap();

    assert_eq!(first, second);
    assert_eq!(rt.get_attr(&Value::Ref(first), "X").unwrap(), Value::Int(1));
    assert_eq!(
        rt.heap().module(first).unwrap().path,
        Some(tree.path_of("a"))
    );
}

#[test]
fn test_module_doc() {
    let mut tree = ModuleTree::new();
    tree.write("a", "doc = \"Shapes.\"\n[values]\nX = 1\n");
    tree.write("b", "[values]\nX = 1\n");
    let mut rt = tree.runtime();
    let a = Value::Ref(rt.import_module("a").unwrap());
    let b = Value::Ref(rt.import_module("b").unwrap());

    assert_eq!(rt.get_attr(&a, "__doc__").unwrap(), Value::Str("Shapes.".into()));
    assert_eq!(rt.get_attr(&b, "__doc__").unwrap(), Value::None);
}

#[test]
fn test_import_missing_module() {
    let tree = ModuleTree::new();
    let mut rt = tree.runtime();
    assert!(matches!(
        rt.import_module("nope"),
        Err(RuntimeError::ModuleNotFound(name)) if name == "nope"
    ));
}

#[test]
fn test_failed_import_is_unregistered() {
    let mut tree = ModuleTree::new();
    tree.write("a", "[imports]\nb = \"missing\"\n");
    let mut rt = tree.runtime();

    assert!(rt.import_module("a").is_err());
    assert!(!rt.registry().contains("a"));
}

#[test]
fn test_mutual_imports_terminate() {
    let mut tree = ModuleTree::new();
    tree.write("a", "[imports]\nb = \"b\"\n");
    tree.write("b", "[imports]\na = \"a\"\n");
    let mut rt = tree.runtime();

    let a = rt.import_module("a").unwrap();
    let b = rt.module("b").unwrap();

    assert_eq!(rt.get_attr(&Value::Ref(a), "b").unwrap(), Value::Ref(b));
    assert_eq!(rt.get_attr(&Value::Ref(b), "a").unwrap(), Value::Ref(a));
}

#[test]
fn test_submodule_bound_in_parent() {
    let mut tree = ModuleTree::new();
    tree.write_package("app", "[values]\nNAME = \"app\"\n");
    tree.write("app.util", "[values]\nX = 3\n");
    let mut rt = tree.runtime();

    let util = rt.import_module("app.util").unwrap();
    let app = rt.module("app").unwrap();

    assert_eq!(rt.get_attr(&Value::Ref(app), "util").unwrap(), Value::Ref(util));
    assert_eq!(
        rt.get_path(&Value::Ref(app), "util.X").unwrap(),
        Value::Int(3)
    );
}

#[test]
fn test_symbol_import_keeps_origin() {
    let mut tree = ModuleTree::new();
    tree.write("b", "[functions.g]\nbody = 7\n");
    tree.write("a", "[imports]\ng = \"b:g\"\n");
    let mut rt = tree.runtime();

    let a = rt.import_module("a").unwrap();
    let g = rt.get_attr(&Value::Ref(a), "g").unwrap();

    assert_eq!(rt.heap().owner_module(g.as_obj().unwrap()), Some("b"));
    assert_eq!(rt.call(&g, vec![]).unwrap(), Value::Int(7));
}

#[test]
fn test_function_params_and_defaults() {
    let mut tree = ModuleTree::new();
    tree.write(
        "a",
        r#"
        [functions.f]
        params = ["x", "y"]
        defaults = [10]
        body = { add = [{ arg = "x" }, { arg = "y" }] }
        "#,
    );
    let mut rt = tree.runtime();
    let a = Value::Ref(rt.import_module("a").unwrap());
    let f = rt.get_attr(&a, "f").unwrap();

    assert_eq!(rt.call(&f, vec![Value::Int(1)]).unwrap(), Value::Int(11));
    assert_eq!(
        rt.call(&f, vec![Value::Int(1), Value::Int(2)]).unwrap(),
        Value::Int(3)
    );
    assert!(matches!(
        rt.call(&f, vec![]),
        Err(RuntimeError::Arity { expected: 2, given: 0, .. })
    ));
}

#[test]
fn test_globals_and_closure() {
    let mut tree = ModuleTree::new();
    tree.write(
        "a",
        r#"
        [values]
        BASE = 40

        [functions.f]
        closure = { k = 2 }
        body = { add = [{ global = "BASE" }, { free = "k" }] }

        [functions.g]
        body = { call = "f" }
        "#,
    );
    let mut rt = tree.runtime();
    let a = Value::Ref(rt.import_module("a").unwrap());

    assert_eq!(call0(&mut rt, &a, "g"), Value::Int(42));

    rt.set_attr(&a, "BASE", Value::Int(0)).unwrap();
    assert_eq!(call0(&mut rt, &a, "g"), Value::Int(2));
}

#[test]
fn test_class_instance_method_property() {
    let mut tree = ModuleTree::new();
    tree.write(
        "shapes",
        r#"
        [classes.Square]
        attrs = { KIND = "square" }
        fields = { side = 3 }
        methods.describe = { body = { concat = ["square of ", { attr = "side" }] } }
        methods.area = { body = { call = "mul", args = [{ attr = "side" }, { attr = "side" }] } }
        properties.perimeter = { get = { add = [{ attr = "side" }, { attr = "side" }, { attr = "side" }, { attr = "side" }] } }
        properties.size = { get = { attr = "side" }, set = { store = "side", value = { arg = "value" } } }

        [functions.mul]
        params = ["a", "b"]
        body = { add = [{ arg = "a" }, { arg = "a" }, { arg = "a" }] }
        "#,
    );
    let mut rt = tree.runtime();
    let shapes = Value::Ref(rt.import_module("shapes").unwrap());
    let class = rt.get_attr(&shapes, "Square").unwrap();
    let sq = rt.call(&class, vec![Value::Int(5)]).unwrap();

    assert_eq!(
        call0(&mut rt, &sq, "describe"),
        Value::Str("square of 5".into())
    );
    assert_eq!(call0(&mut rt, &sq, "area"), Value::Int(15));
    assert_eq!(rt.get_attr(&sq, "perimeter").unwrap(), Value::Int(20));
    assert_eq!(
        rt.get_attr(&sq, "KIND").unwrap(),
        Value::Str("square".into())
    );

    rt.set_attr(&sq, "size", Value::Int(2)).unwrap();
    assert_eq!(rt.get_attr(&sq, "side").unwrap(), Value::Int(2));
    assert!(matches!(
        rt.set_attr(&sq, "perimeter", Value::Int(1)),
        Err(RuntimeError::ReadOnly { .. })
    ));
}

#[test]
fn test_module_instances_and_bound_methods() {
    let mut tree = ModuleTree::new();
    tree.write(
        "a",
        r#"
        [classes.C]
        fields = { n = 1 }
        methods.get = { body = { attr = "n" } }

        [instances.obj]
        class = "C"
        fields = { n = 9 }

        [bound]
        get_n = "obj.get"
        "#,
    );
    let mut rt = tree.runtime();
    let a = Value::Ref(rt.import_module("a").unwrap());
    let bound = rt.get_attr(&a, "get_n").unwrap();

    assert_eq!(rt.heap().kind(bound.as_obj().unwrap()), Some(ObjectKind::Method));
    assert_eq!(rt.call(&bound, vec![]).unwrap(), Value::Int(9));
}

#[test]
fn test_bound_requires_method() {
    let mut tree = ModuleTree::new();
    tree.write("a", "[values]\nX = 1\n[bound]\nm = \"X\"\n");
    let mut rt = tree.runtime();
    assert!(matches!(
        rt.import_module("a"),
        Err(RuntimeError::Exec { .. })
    ));
}

#[test]
fn test_readonly_class_attribute() {
    let mut tree = ModuleTree::new();
    tree.write(
        "a",
        "[classes.C]\nattrs = { TAG = \"t\" }\nreadonly = [\"TAG\"]\n",
    );
    let mut rt = tree.runtime();
    let a = Value::Ref(rt.import_module("a").unwrap());
    let class = rt.get_attr(&a, "C").unwrap();

    assert!(matches!(
        rt.set_attr(&class, "TAG", Value::Int(1)),
        Err(RuntimeError::ReadOnly { .. })
    ));
    let c = rt.heap_mut().class_mut(class.as_obj().unwrap()).unwrap();
    assert!(c.del_attr("TAG").is_err());
    assert!(c.del_attr("MISSING").is_err());
}

#[test]
fn test_recursion_limit() {
    let mut tree = ModuleTree::new();
    tree.write("a", "[functions.f]\nbody = { call = \"f\" }\n");
    let mut rt = tree.runtime();
    let a = Value::Ref(rt.import_module("a").unwrap());
    let f = rt.get_attr(&a, "f").unwrap();

    assert!(matches!(
        rt.call(&f, vec![]),
        Err(RuntimeError::RecursionLimit)
    ));
    // depth is restored after unwinding
    assert!(matches!(
        rt.call(&f, vec![]),
        Err(RuntimeError::RecursionLimit)
    ));
}

#[test]
fn test_collect_garbage_keeps_session_values() {
    let mut tree = ModuleTree::new();
    tree.write("a", "[classes.C]\nfields = { n = 1 }\n");
    let mut rt = tree.runtime();
    let a = Value::Ref(rt.import_module("a").unwrap());
    let class = rt.get_attr(&a, "C").unwrap();
    let kept = rt.call(&class, vec![]).unwrap();
    let dropped = rt.call(&class, vec![]).unwrap();
    rt.session_set("kept", kept.clone()).unwrap();

    rt.collect_garbage();

    assert!(rt.heap().is_alive(kept.as_obj().unwrap()));
    assert!(!rt.heap().is_alive(dropped.as_obj().unwrap()));
}

#[test]
fn test_describe() {
    let mut tree = ModuleTree::new();
    tree.write("a", "[classes.C]\n[functions.f]\nbody = 1\n");
    let mut rt = tree.runtime();
    let a = Value::Ref(rt.import_module("a").unwrap());
    let class = rt.get_attr(&a, "C").unwrap();
    let f = rt.get_attr(&a, "f").unwrap();

    assert_eq!(rt.describe(&a), "<module 'a'>");
    assert_eq!(rt.describe(&class), "<class 'a.C'>");
    assert_eq!(rt.describe(&f), "<function a.f>");
    assert_eq!(rt.describe(&Value::Int(3)), "3");
}
