use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use ecoquest::auth_state::AuthContext;
use ecoquest::config::{self, ClientConfig};
use ecoquest::identity::{IdentityClient, RoleResolver, SupabaseClient};
use ecoquest::profile::AvatarFile;
use ecoquest::routes::RecordingNavigator;
use ecoquest::screens::{CallbackHandler, CredentialScreen, ProfileScreen};

const WATCH_TIMEOUT: Duration = Duration::from_secs(15);

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} login --email <E> --password <P>\n  {program} admin-login --email <E> --password <P>\n  {program} authorize --provider <name> --redirect <url>\n  {program} callback <url> [--verifier <v>]\n  {program} profile --email <E> --password <P> [--username U] [--name N] [--bio B] [--avatar FILE]\n\nFlags:\n  --url <url>     Supabase project URL (env: {url})\n  --key <key>     Supabase anon key (env: {key})\n  -h, --help      Show this help\n\nOther settings come from {bucket}, {table}, {redir}, {settle} and {max}.",
        url = config::ENV_SUPABASE_URL,
        key = config::ENV_SUPABASE_ANON_KEY,
        bucket = config::ENV_AVATAR_BUCKET,
        table = config::ENV_PROFILE_TABLE,
        redir = config::ENV_REDIRECT_DELAY_MS,
        settle = config::ENV_SETTLE_DELAY_MS,
        max = config::ENV_MAX_AVATAR_BYTES,
    );
}

fn parse_arg(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag {
            return args.get(i + 1).cloned();
        }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn required(args: &[String], flag: &str) -> Result<String> {
    parse_arg(args, flag).ok_or_else(|| anyhow!("missing {}", flag))
}

fn guess_content_type(path: &Path) -> &'static str {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

struct App {
    config: ClientConfig,
    client: Arc<SupabaseClient>,
    auth: Arc<AuthContext>,
    nav: Arc<RecordingNavigator>,
}

impl App {
    async fn start(config: ClientConfig) -> Result<Self> {
        let client = Arc::new(SupabaseClient::new(&config).context("building supabase client")?);
        let dyn_client: Arc<dyn IdentityClient> = client.clone();
        let resolver = RoleResolver::standard(dyn_client.clone(), config.profile_table.clone());
        let auth = AuthContext::start(dyn_client, resolver).await;
        Ok(Self { config, client, auth, nav: Arc::new(RecordingNavigator::new()) })
    }

    fn report_navigation(&self) {
        for n in self.nav.history() {
            println!("-> {}{}", n.route, if n.replace { " (replace)" } else { "" });
        }
    }
}

async fn run_login(app: &App, args: &[String], admin: bool) -> Result<()> {
    let screen = if admin {
        CredentialScreen::admin(app.auth.clone(), app.nav.clone(), app.config.redirect_delay)
    } else {
        CredentialScreen::student(app.auth.clone(), app.nav.clone(), app.config.redirect_delay)
    };
    screen.set_email(&required(args, "--email")?);
    screen.set_password(&required(args, "--password")?);
    println!("[{}]", screen.submit_label());
    let submitted = screen.submit().await;
    if let Err(e) = &submitted {
        println!("error: {}", e.message());
        if e.kind() == "credential" {
            println!("no account yet? sign up at {}", screen.view().signup);
        }
    }
    if tokio::time::timeout(WATCH_TIMEOUT, screen.watch_until_exit()).await.is_err() {
        println!("auth state did not settle within {:?}", WATCH_TIMEOUT);
    }
    if let Some(msg) = screen.view().error.filter(|_| submitted.is_ok()) {
        println!("{}", msg);
    }
    screen.settle().await;
    app.report_navigation();
    Ok(())
}

async fn run_callback(app: &App, args: &[String]) -> Result<()> {
    let url = args.get(2).filter(|a| !a.starts_with("--")).cloned().ok_or_else(|| anyhow!("missing callback url"))?;
    if let Some(v) = parse_arg(args, "--verifier") {
        app.client.set_code_verifier(v);
    }
    let handler = CallbackHandler::new(app.auth.clone(), app.nav.clone(), app.config.settle_delay);
    match tokio::time::timeout(WATCH_TIMEOUT, handler.run(&url)).await {
        Ok(Some(to)) => info!(target: "ecoquest::callback", route = %to.route, "callback resolved"),
        Ok(None) => println!("callback screen closed before resolving"),
        Err(_) => println!("auth state did not settle within {:?}", WATCH_TIMEOUT),
    }
    app.report_navigation();
    Ok(())
}

async fn run_profile(app: &App, args: &[String]) -> Result<()> {
    let email = required(args, "--email")?;
    let password = required(args, "--password")?;
    app.client
        .sign_in_with_password(&email, &password)
        .await
        .map_err(|e| anyhow!("sign-in failed: {}", e))?;

    let screen = ProfileScreen::new(app.auth.clone(), app.nav.clone(), &app.config);
    screen.fetch().await;
    let view = screen.view();
    if let Some(m) = &view.message {
        println!("{}", m.text);
        return Ok(());
    }
    if view.snapshot.is_none() {
        app.report_navigation();
        return Ok(());
    }
    let p = &view.buffer;
    let avatar = p.profile_picture.clone().unwrap_or_else(|| format!("[{}]", p.initial()));
    println!("{} {} (@{})  joined {}", avatar, p.name, p.username, p.joined_label());
    println!("points {}  quests {}  earned {}  donated {}", p.points, p.quest_completed, p.total_points_earned, p.total_points_donated);

    if let Some(v) = parse_arg(args, "--username") { screen.set_username(&v); }
    if let Some(v) = parse_arg(args, "--name") { screen.set_name(&v); }
    if let Some(v) = parse_arg(args, "--bio") { screen.set_bio(&v); }
    if let Some(file) = parse_arg(args, "--avatar") {
        let path = Path::new(&file);
        let bytes = tokio::fs::read(path).await.with_context(|| format!("reading {}", file))?;
        let avatar = AvatarFile {
            file_name: path.file_name().and_then(|n| n.to_str()).unwrap_or(&file).to_string(),
            content_type: guess_content_type(path).to_string(),
            bytes,
        };
        let _ = screen.upload_avatar(avatar).await;
        if let Some(m) = screen.view().message {
            println!("{}", m.text);
        }
    }
    if screen.view().can_save() {
        let _ = screen.save().await;
        if let Some(m) = screen.view().message {
            println!("{}", m.text);
        }
    } else {
        println!("nothing to save");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("building log filter")?;
    fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().cloned().unwrap_or_else(|| "ecoquest".to_string());
    if args.len() < 2 || has_flag(&args, "--help") || has_flag(&args, "-h") {
        print_usage(&program);
        return Ok(());
    }

    // CLI flags override the environment
    let arg_url = parse_arg(&args, "--url");
    let arg_key = parse_arg(&args, "--key");
    let config = ClientConfig::from_lookup(|k| match k {
        config::ENV_SUPABASE_URL if arg_url.is_some() => arg_url.clone(),
        config::ENV_SUPABASE_ANON_KEY if arg_key.is_some() => arg_key.clone(),
        _ => env::var(k).ok(),
    })
    .map_err(|e| anyhow!("{}", e))?;
    info!(target: "ecoquest", url = %config.supabase_url, table = %config.profile_table, "ecoquest starting");

    let app = App::start(config).await?;
    let result = match args[1].as_str() {
        "login" => run_login(&app, &args, false).await,
        "admin-login" => run_login(&app, &args, true).await,
        "callback" => run_callback(&app, &args).await,
        "profile" => run_profile(&app, &args).await,
        "authorize" => {
            let provider = required(&args, "--provider")?;
            let redirect = required(&args, "--redirect")?;
            let url = app.client.authorize_url(&provider, &redirect).map_err(|e| anyhow!("{}", e))?;
            println!("{}", url);
            if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "code_challenge") {
                println!("verifier: {}", v);
            }
            Ok(())
        }
        other => {
            print_usage(&program);
            bail!("unknown command '{}'", other)
        }
    };
    app.auth.shutdown();
    result
}
