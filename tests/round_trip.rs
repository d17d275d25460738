//! Rendering is a fixed point of render → load, and a reloaded function
//! behaves like the original.

use std::rc::Rc;

use opgraph::prelude::*;
use pretty_assertions::assert_eq;

fn registry() -> Rc<TypeRegistry> {
    Rc::new(TypeRegistry::with_builtins())
}

fn int(name: &str) -> Expr {
    Expr::var(name, DataType::Int32)
}

/// Reload `function`, check the fixed point and compare both on `inputs`.
fn assert_equivalent(function: &Function, registry: &Rc<TypeRegistry>, inputs: &[Vec<Value>]) {
    let first = render(function).unwrap();
    let reloaded = opgraph::reload(function, registry).unwrap();
    assert_eq!(render(&reloaded).unwrap(), first);

    let original = compile(function, Rc::clone(registry)).unwrap();
    let copy = compile(&reloaded, Rc::clone(registry)).unwrap();
    for args in inputs {
        assert_eq!(copy.call(args), original.call(args), "inputs {args:?}");
    }
}

#[test]
fn loops_and_branches() {
    let registry = registry();
    let mut b = FunctionBuilder::new(
        Rc::clone(&registry),
        vec![Param::named("limit", DataType::Int32)],
        DataType::Int64,
    );
    b.set_typed("total", DataType::Int64, Expr::constant(0i64))
        .unwrap();
    b.set("i", Expr::constant(0)).unwrap();
    b.while_(Expr::lt(int("i"), int("limit"))).unwrap();
    b.set("i", Expr::add(int("i"), Expr::constant(1))).unwrap();
    b.if_(Expr::equal(int("i"), Expr::constant(3)))
        .unwrap()
        .continue_()
        .unwrap()
        .end()
        .unwrap();
    b.set(
        "total",
        Expr::add(Expr::var("total", DataType::Int64), int("i")),
    )
    .unwrap();
    b.end().unwrap();
    b.ret_value(Expr::var("total", DataType::Int64)).unwrap();
    let function = b.finish().unwrap();

    assert_equivalent(
        &function,
        &registry,
        &[
            vec![Value::Int32(0)],
            vec![Value::Int32(5)],
            vec![Value::Int32(100)],
        ],
    );
}

#[test]
fn switch_and_exceptions() {
    let registry = registry();
    let ctor = registry
        .find_constructor(
            &DataType::named(exceptions::ARGUMENT),
            &[DataType::String],
            BindingFlags::lookup(false),
        )
        .unwrap();
    let mut b = FunctionBuilder::new(
        Rc::clone(&registry),
        vec![Param::named("k", DataType::Int32)],
        DataType::String,
    );
    b.set("out", Expr::constant("start")).unwrap();
    b.try_().unwrap();
    b.switch(int("k")).unwrap();
    b.case(Expr::constant(1)).unwrap().begin().unwrap();
    b.set("out", Expr::constant("one")).unwrap().end().unwrap();
    b.case(Expr::constant(2)).unwrap().begin().unwrap();
    b.throw(Expr::new_object(ctor, vec![Expr::constant("two")]))
        .unwrap()
        .end()
        .unwrap();
    b.default().unwrap().begin().unwrap();
    b.set("out", Expr::constant("many")).unwrap().end().unwrap();
    b.end().unwrap();
    b.catch(Some(DataType::named(exceptions::ARGUMENT)), None)
        .unwrap();
    b.set("out", Expr::constant("caught")).unwrap();
    b.finally().unwrap();
    b.set(
        "out",
        Expr::add(Expr::var("out", DataType::String), Expr::constant("!")),
    )
    .unwrap();
    b.end().unwrap();
    b.ret_value(Expr::var("out", DataType::String)).unwrap();
    let function = b.finish().unwrap();

    assert_equivalent(
        &function,
        &registry,
        &[
            vec![Value::Int32(1)],
            vec![Value::Int32(2)],
            vec![Value::Int32(7)],
        ],
    );
}

#[test]
fn nested_rethrow_trace() {
    let registry = registry();
    let ctor = registry
        .find_constructor(
            &DataType::named(exceptions::ARGUMENT),
            &[DataType::String],
            BindingFlags::lookup(false),
        )
        .unwrap();
    let trace = || Expr::var("trace", DataType::String);
    let mut b = FunctionBuilder::new(Rc::clone(&registry), vec![], DataType::String);
    b.set("trace", Expr::constant("")).unwrap();
    b.try_().unwrap();
    b.try_().unwrap();
    b.set("trace", Expr::add(trace(), Expr::constant("a")))
        .unwrap();
    b.throw(Expr::new_object(ctor, vec![Expr::constant("boom")]))
        .unwrap();
    b.catch(None, None).unwrap();
    b.set("trace", Expr::add(trace(), Expr::constant("b")))
        .unwrap();
    b.rethrow().unwrap();
    b.finally().unwrap();
    b.set("trace", Expr::add(trace(), Expr::constant("c")))
        .unwrap();
    b.end().unwrap();
    b.catch(Some(DataType::named(exceptions::EXCEPTION)), None)
        .unwrap();
    b.set("trace", Expr::add(trace(), Expr::constant("d")))
        .unwrap();
    b.end().unwrap();
    b.ret_value(trace()).unwrap();
    let function = b.finish().unwrap();

    assert_equivalent(&function, &registry, &[vec![]]);
    let result = compile(&function, registry).unwrap().call(&[]).unwrap();
    assert_eq!(result, Value::string("abcd"));
}

#[test]
fn call_sites_and_members() {
    let registry = registry();
    let sqrt = registry
        .find_method(
            &DataType::named("System.Math"),
            "Sqrt",
            &[DataType::Float64],
            BindingFlags::lookup(true),
        )
        .unwrap();
    let mut b = FunctionBuilder::new(
        Rc::clone(&registry),
        vec![Param::named("s", DataType::String)],
        DataType::Float64,
    );
    b.set(
        "len",
        Expr::dynamic(
            CallSite::get_member("Length", DataType::Int32),
            vec![Expr::var("s", DataType::String)],
        ),
    )
    .unwrap();
    b.ret_value(Expr::call_static(
        sqrt,
        vec![Expr::convert(int("len"), DataType::Float64)],
    ))
    .unwrap();
    let function = b.finish().unwrap();

    assert_equivalent(
        &function,
        &registry,
        &[vec![Value::string("four")], vec![Value::string("")]],
    );
}

#[test]
fn custom_render_options_still_load() {
    let registry = registry();
    let mut b = FunctionBuilder::new(Rc::clone(&registry), vec![], DataType::Int32);
    b.set("n", Expr::constant(1)).unwrap();
    b.do_().unwrap();
    b.set("n", Expr::mul(int("n"), Expr::constant(2))).unwrap();
    b.if_(Expr::lt(Expr::constant(100), int("n")))
        .unwrap()
        .break_()
        .unwrap()
        .end()
        .unwrap();
    b.end().unwrap();
    b.ret_value(int("n")).unwrap();
    let function = b.finish().unwrap();

    let compact = render_with(
        &function,
        &RenderOptions {
            indent: 1,
            section_comments: false,
        },
    )
    .unwrap();
    let loaded = load(&compact, &registry).unwrap();
    assert_eq!(render(&loaded).unwrap(), render(&function).unwrap());
    let result = compile(&loaded, registry).unwrap().call(&[]).unwrap();
    assert_eq!(result, Value::Int32(128));
}
