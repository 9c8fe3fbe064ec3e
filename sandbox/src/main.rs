//! Host-side playground for the expression core: builds a handful of
//! showcase expressions, reduces them and prints every stage.

use std::fs::File;

use clap::{App, Arg};
use mathcore::{Pool, PoolError, Preferences, UserExpression};

fn load_prefs(path: &str) -> Result<Preferences, String> {
    let file = File::open(path).map_err(|e| format!("Opening {}: {}", path, e))?;
    serde_yaml::from_reader(file).map_err(|e| format!("Parsing {}: {}", path, e))
}

struct Showcase {
    label: &'static str,
    build: fn(&mut Pool) -> Result<usize, PoolError>,
}

static SHOWCASES: &[Showcase] = &[
    Showcase {
        label: "2 + 3",
        build: |pool| {
            pool.push_integer(2)?;
            pool.push_integer(3)?;
            pool.push_add(2)
        },
    },
    Showcase {
        label: "x + 5 - x",
        build: |pool| {
            pool.push_symbol("x")?;
            pool.push_integer(5)?;
            pool.push_add(2)?;
            pool.push_symbol("x")?;
            pool.push_sub()
        },
    },
    Showcase {
        label: "2 ^ 10",
        build: |pool| {
            pool.push_integer(2)?;
            pool.push_integer(10)?;
            pool.push_pow()
        },
    },
    Showcase {
        label: "2 ^ 500",
        build: |pool| {
            pool.push_integer(2)?;
            pool.push_integer(500)?;
            pool.push_pow()
        },
    },
    Showcase {
        label: "sqrt(x) * sqrt(x)... kept symbolic",
        build: |pool| {
            pool.push_symbol("x")?;
            pool.push_sqrt()?;
            pool.push_symbol("x")?;
            pool.push_sqrt()?;
            pool.push_mul(2)
        },
    },
    Showcase {
        label: "1 / 0",
        build: |pool| {
            pool.push_integer(1)?;
            pool.push_integer(0)?;
            pool.push_div()
        },
    },
];

fn run(pool: &mut Pool, prefs: &Preferences, verbose: bool) -> Result<(), String> {
    for showcase in SHOWCASES {
        (showcase.build)(pool).map_err(|e| e.to_string())?;
        let user = UserExpression::adopt(pool).map_err(|e| e.to_string())?;
        let reduced = user.reduce(pool, prefs).map_err(|e| e.to_string())?;
        let display = reduced.display(pool).map_err(|e| e.to_string())?;
        let value = reduced.approximate(pool, prefs).map_err(|e| e.to_string())?;
        let kind = if reduced.is_exact() { "exact" } else { "approx" };
        println!("{:<40} => {} ({}) ~ {}", showcase.label, display, kind, value);
        if verbose {
            print!("{}", pool.log());
        }
    }
    Ok(())
}

fn main() {
    let matches = App::new("mathcore sandbox")
        .about("Reduces a set of showcase expressions and prints every stage")
        .arg(
            Arg::with_name("prefs")
                .long("prefs")
                .takes_value(true)
                .help("YAML file with computation preferences"),
        )
        .arg(
            Arg::with_name("capacity")
                .long("capacity")
                .takes_value(true)
                .default_value("4096")
                .help("Pool capacity in blocks"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Dump the pool after each computation"),
        )
        .get_matches();

    let prefs = match matches.value_of("prefs") {
        Some(path) => load_prefs(path).expect("Loading preferences"),
        None => Preferences::default(),
    };
    let capacity: usize = matches
        .value_of("capacity")
        .and_then(|raw| raw.parse().ok())
        .expect("Parsing capacity");

    let mut pool = Pool::with_name("sandbox", capacity);
    if let Err(message) = run(&mut pool, &prefs, matches.is_present("verbose")) {
        eprintln!("{}", message);
        std::process::exit(1);
    }
}
