use std::{hint::black_box, str::FromStr};

use apache_rewrite::{Request, Rewrite, Tester, directive::rule::RewriteRule, environment::Environment};
use criterion::{Criterion, criterion_group, criterion_main};
use pprof::criterion::{Output, PProfProfiler};

const CONFIG: &str = r#"
ServerName main.example.com
RewriteEngine on

<VirtualHost *:80>
    ServerName www.example.com
    RewriteEngine on
    RewriteCond %{HTTP_HOST} !^www\. [NC]
    RewriteRule ^/(.*) http://www.example.com/$1 [R=301,L]
    RewriteRule ^/static/(.*) /files/$1 [L]
    RewriteRule ^/blog/(\d+)/(.*)$ /index.php?post=$1&slug=$2 [QSA,L]
</VirtualHost>

<VirtualHost *:80>
    ServerName api.example.com
    RewriteEngine on
    RewriteRule ^/v1/(.*) /v2/$1 [N]
    RewriteRule ^/v2/(.*) http://backend/$1 [P]
</VirtualHost>
"#;

fn profiled() -> Criterion {
    let output = Output::Flamegraph(None);
    let prof = PProfProfiler::new(1000, output);
    Criterion::default().with_profiler(prof)
}

pub fn rule_match(rule: &RewriteRule) {
    let mut env = Environment::default();
    let outcome = rule.apply("/static/hello/world", &mut env).unwrap();
    assert_eq!(outcome.path, "/files/hello/world");
}

pub fn evaluate(tester: &Tester, request: &Request) {
    assert!(matches!(
        tester.evaluate(request).map(|e| e.outcome.rewrite),
        Ok(Rewrite::Uri(uri)) if uri == "/index.php?post=42&slug=hello&ref=feed",
    ))
}

pub fn bench_rule_match(c: &mut Criterion) {
    let rule = RewriteRule::from_str("RewriteRule ^/static/(.*) /files/$1").unwrap();
    c.bench_function("rule_match", |b| {
        b.iter(|| black_box(rule_match(black_box(&rule))))
    });
}

pub fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_config", |b| {
        b.iter(|| black_box(Tester::from_str(black_box(CONFIG)).unwrap()))
    });
}

pub fn bench_evaluate(c: &mut Criterion) {
    let tester = Tester::from_str(CONFIG).unwrap();
    let request = Request::get("/blog/42/hello?ref=feed", "www.example.com");
    c.bench_function("evaluate_request", |b| {
        b.iter(|| black_box(evaluate(black_box(&tester), black_box(&request))))
    });
}

criterion_group!(
    name = benches;
    config = profiled();
    targets = bench_rule_match, bench_parse, bench_evaluate
);
criterion_main!(benches);
