// src/main.rs
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::exit;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use tvfamily_client::api::ServiceError;
use tvfamily_client::config;
use tvfamily_client::core::mainloop::MainLoop;
use tvfamily_client::core::requests::{ServerRequest, ServerRequestList};
use tvfamily_client::core::Core;
use tvfamily_client::data::{Media, VideoStatus};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("Usage: tvfamily-client [-h] [-v] -a ADDRESS");
    eprintln!();
    eprintln!("  -a, --address ADDRESS   server address, e.g. http://fam.local:8888");
    eprintln!("  -h, --help              show this help and exit");
    eprintln!("  -v, --version           show the version and exit");
}

fn print_commands() {
    println!("  profiles              list profiles on the server");
    println!("  use NAME              select a profile");
    println!("  profile               show the selected profile");
    println!("  create NAME [FILE]    create a profile, with an optional PNG picture");
    println!("  setpic FILE           replace the selected profile's picture");
    println!("  delete                delete the selected profile");
    println!("  categories            list media categories");
    println!("  top CATEGORY          list the category's top medias");
    println!("  poster N              fetch the poster of entry N from the last top");
    println!("  title TITLE_ID        show one title's details");
    println!("  status TITLE_ID [SEASON EPISODE]   media file status");
    println!("  quit                  exit");
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let cfg = config::load_config();
    let mut address = cfg.server_address.clone();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                return;
            }
            "-v" | "--version" => {
                println!("tvfamily-client {VERSION}");
                return;
            }
            "-a" | "--address" => address = args.next(),
            other => {
                eprintln!("error: unknown argument {other}");
                print_usage();
                exit(1);
            }
        }
    }
    let Some(address) = address else {
        eprintln!("error: missing argument --address");
        exit(1);
    };

    let core = match Core::new(&address, cfg.cache_dir.clone()) {
        Ok(core) => Arc::new(core),
        Err(e) => {
            eprintln!("error: {e}");
            exit(1);
        }
    };

    Shell::new(core, Duration::from_secs(cfg.retry_secs)).run();
}

/// Command-line stand-in for the GUI: this thread drains the loop, the
/// request callbacks print instead of painting.
struct Shell {
    core: Arc<Core>,
    main_loop: MainLoop,
    requests: ServerRequestList,
    medias: Arc<Mutex<Vec<Media>>>,
    retry: Duration,
}

impl Shell {
    fn new(core: Arc<Core>, retry: Duration) -> Self {
        let main_loop = MainLoop::new();
        let requests = ServerRequestList::new(main_loop.handle());
        Self {
            core,
            main_loop,
            requests,
            medias: Arc::new(Mutex::new(Vec::new())),
            retry,
        }
    }

    fn run(&mut self) {
        println!("tvfamily-client {VERSION} (type `help` for commands)");
        let stdin = io::stdin();
        loop {
            print!("> ");
            let _ = io::stdout().flush();
            let mut line = String::new();
            match stdin.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    eprintln!("error: {e}");
                    break;
                }
            }
            let mut words = line.split_whitespace();
            let Some(command) = words.next() else {
                continue;
            };
            let rest: Vec<&str> = words.collect();
            match command {
                "help" => print_commands(),
                "profiles" => self.cmd_profiles(),
                "use" => self.cmd_use(&rest),
                "profile" => self.cmd_profile(),
                "create" => self.cmd_create(&rest),
                "setpic" => self.cmd_set_picture(&rest),
                "delete" => self.cmd_delete(),
                "categories" => self.cmd_categories(),
                "top" => self.cmd_top(&rest),
                "poster" => self.cmd_poster(&rest),
                "title" => self.cmd_title(&rest),
                "status" => self.cmd_status(&rest),
                "quit" | "exit" => break,
                other => println!("unknown command `{other}`; try `help`"),
            }
        }
        self.requests.cancel_all();
    }

    // Pump the loop until the request's callback has run for the last time.
    fn wait_for<A, T>(&mut self, request: &ServerRequest<A, T>) {
        while !request.is_finished() {
            self.main_loop.run_for(Duration::from_millis(50));
        }
    }

    fn cmd_profiles(&mut self) {
        if !self.retry.is_zero() {
            println!(
                "(asking again every {}s while the server is unreachable; Ctrl-C aborts)",
                self.retry.as_secs()
            );
        }
        let core = Arc::clone(&self.core);
        let request = self.requests.add(
            move |_: &()| core.get_profiles(),
            (),
            |req: &ServerRequest<(), Vec<String>>| match req.take_result() {
                Some(profiles) => {
                    for profile in profiles {
                        println!("  {profile}");
                    }
                }
                None => print_request_error(req.error()),
            },
            self.retry,
        );
        self.wait_for(&request);
    }

    fn cmd_use(&mut self, args: &[&str]) {
        if args.is_empty() {
            println!("usage: use NAME");
            return;
        }
        let name = args.join(" ");
        self.core.set_profile(Some(&name));
        println!("profile set to {name}");
    }

    fn cmd_profile(&self) {
        match self.core.get_profile() {
            Some(profile) => println!("{profile}"),
            None => println!("no profile selected"),
        }
    }

    fn cmd_create(&mut self, args: &[&str]) {
        let (name, picture_path) = match args {
            [name] => (*name, None),
            [name, path] => (*name, Some(*path)),
            _ => {
                println!("usage: create NAME [PICTURE.png]");
                return;
            }
        };
        let picture = match picture_path {
            Some(path) => match fs::read(path) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    println!("cannot read {path}: {e}");
                    return;
                }
            },
            None => None,
        };
        match self.core.create_profile(name, picture) {
            Ok(()) => println!("profile {name} created"),
            Err(e) => println!("error: {e}"),
        }
    }

    fn cmd_set_picture(&mut self, args: &[&str]) {
        let [path] = args else {
            println!("usage: setpic PICTURE.png");
            return;
        };
        let picture = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                println!("cannot read {path}: {e}");
                return;
            }
        };
        match self.core.set_profile_picture(picture) {
            Ok(()) => println!("picture updated"),
            Err(e) => println!("error: {e}"),
        }
    }

    fn cmd_delete(&mut self) {
        match self.core.delete_profile() {
            Ok(()) => {
                self.core.set_profile(None);
                println!("profile deleted");
            }
            Err(e) => println!("error: {e}"),
        }
    }

    fn cmd_categories(&mut self) {
        let core = Arc::clone(&self.core);
        let request = self.requests.add(
            move |_: &()| core.get_categories(),
            (),
            |req: &ServerRequest<(), Vec<String>>| match req.take_result() {
                Some(categories) => {
                    for category in categories {
                        println!("  {category}");
                    }
                }
                None => print_request_error(req.error()),
            },
            self.retry,
        );
        self.wait_for(&request);
    }

    fn cmd_top(&mut self, args: &[&str]) {
        if args.is_empty() {
            println!("usage: top CATEGORY");
            return;
        }
        let category = args.join(" ");
        let core = Arc::clone(&self.core);
        let medias = Arc::clone(&self.medias);
        let request = self.requests.add(
            move |category: &String| core.get_medias(category),
            category,
            move |req: &ServerRequest<String, Vec<Media>>| match req.take_result() {
                Some(list) => {
                    if list.is_empty() {
                        println!("nothing in {}", req.args());
                    }
                    for (i, media) in list.iter().enumerate() {
                        println!("{:3}  {media}", i + 1);
                    }
                    *medias.lock().unwrap() = list;
                }
                None => print_request_error(req.error()),
            },
            self.retry,
        );
        self.wait_for(&request);
    }

    fn cmd_poster(&mut self, args: &[&str]) {
        let media = match args {
            [index] => match index.parse::<usize>() {
                Ok(n) if n >= 1 => self.medias.lock().unwrap().get(n - 1).cloned(),
                _ => None,
            },
            _ => {
                println!("usage: poster N   (N from the last `top` listing)");
                return;
            }
        };
        let Some(media) = media else {
            println!("no such entry; run `top CATEGORY` first");
            return;
        };
        let core = Arc::clone(&self.core);
        let request = self.requests.add(
            move |media: &Media| core.get_poster(media),
            media,
            |req: &ServerRequest<Media, PathBuf>| match req.take_result() {
                Some(path) => println!("{} -> {}", req.args(), path.display()),
                None => print_request_error(req.error()),
            },
            Duration::ZERO,
        );
        self.wait_for(&request);
    }

    fn cmd_title(&mut self, args: &[&str]) {
        let [title_id] = args else {
            println!("usage: title TITLE_ID");
            return;
        };
        match self.core.get_title(title_id) {
            Ok(title) => {
                println!("{} ({})", title.title, title.title_id);
                if let Some(year) = title.air_year {
                    println!("  year: {year}");
                }
                if let Some(genre) = &title.genre {
                    println!("  genre: {}", genre.to_label());
                }
                if let Some(rating) = &title.rating {
                    println!("  rating: {rating}");
                }
                if let Some(plot) = &title.plot {
                    println!("  {plot}");
                }
                for season in &title.seasons {
                    println!(
                        "  season {} ({} episodes)",
                        season.season,
                        season.episodes.len()
                    );
                }
            }
            Err(e) => println!("error: {e}"),
        }
    }

    fn cmd_status(&mut self, args: &[&str]) {
        let (title_id, season, episode) = match args {
            [id] => (*id, None, None),
            [id, season, episode] => match (season.parse::<u32>(), episode.parse::<u32>()) {
                (Ok(s), Ok(e)) => (*id, Some(s), Some(e)),
                _ => {
                    println!("usage: status TITLE_ID [SEASON EPISODE]");
                    return;
                }
            },
            _ => {
                println!("usage: status TITLE_ID [SEASON EPISODE]");
                return;
            }
        };
        match self.core.get_media_status(title_id, season, episode) {
            Ok(status) => {
                match status.status {
                    VideoStatus::Downloading => {
                        println!("{} ({}%)", status.status, status.progress)
                    }
                    _ => println!("{}", status.status),
                }
                if !status.message.is_empty() {
                    println!("  {}", status.message);
                }
            }
            Err(e) => println!("error: {e}"),
        }
    }
}

fn print_request_error(error: Option<ServiceError>) {
    if let Some(e) = error {
        println!("error: {e}");
    }
}
