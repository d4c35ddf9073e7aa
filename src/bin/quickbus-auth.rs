//! quickbus-auth
//!
//! 运维用的命令行工具：用配置好的后端登录、查看或注销本机保存的会话。
//! 配置来自 `QUICKBUS_*` 环境变量，会话保存在 `QUICKBUS_STORE_PATH` 指向的文件。

use std::env;
use std::io::{self, BufRead};
use std::process::ExitCode;

use quickbus::config::ProcessEnv;
use quickbus::guard::resolve_path;
use quickbus::request::ReqwestHttpClient;
use quickbus::storage::FileStore;
use quickbus::{
    AuthConfig, AuthError, AuthResult, AuthSessionController, SessionState, SessionStore,
    build_backend,
};
use tracing_subscriber::EnvFilter;

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} login <username> [password]   # password is read from stdin when omitted\n  {program} status [path]                  # show the stored session and the guard decision for a page\n  {program} logout\n\nEnvironment:\n  QUICKBUS_AUTH_MODE         credential | managed | demo (default: credential)\n  QUICKBUS_API_BASE          backend base address\n  QUICKBUS_MANAGED_URL       managed session service address\n  QUICKBUS_MANAGED_ANON_KEY  managed session service public key\n  QUICKBUS_STORE_PATH        session file (default: .quickbus-session.json)\n  RUST_LOG                   log filter (default: info)"
    );
}

enum Command {
    Login { username: String, password: Option<String> },
    Status { path: Option<String> },
    Logout,
}

fn parse_args(args: &[String]) -> Option<Command> {
    match args {
        [cmd, username] if cmd == "login" => Some(Command::Login {
            username: username.clone(),
            password: None,
        }),
        [cmd, username, password] if cmd == "login" => Some(Command::Login {
            username: username.clone(),
            password: Some(password.clone()),
        }),
        [cmd] if cmd == "status" => Some(Command::Status { path: None }),
        [cmd, path] if cmd == "status" => Some(Command::Status {
            path: Some(path.clone()),
        }),
        [cmd] if cmd == "logout" => Some(Command::Logout),
        _ => None,
    }
}

fn read_password() -> AuthResult<String> {
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| AuthError::internal(e.to_string()).in_op("cli.read_password"))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn describe(state: &SessionState) -> String {
    match state {
        SessionState::Initializing => "initializing".to_string(),
        SessionState::Unauthenticated => "signed out".to_string(),
        SessionState::Authenticated(session) => {
            format!("signed in as {} ({})", session.label(), session.role)
        }
    }
}

async fn run(command: Command) -> AuthResult<ExitCode> {
    let config = AuthConfig::from_env(&ProcessEnv)?;
    let store = SessionStore::new(FileStore::new(&config.store_path), &config);
    let backend = build_backend(&config, ReqwestHttpClient::new());
    let controller = AuthSessionController::new(store, backend);

    tracing::debug!(backend = controller.backend_name(), store = %config.store_path.display(), "starting");
    controller.initialize().await;

    match command {
        Command::Login { username, password } => {
            let password = match password {
                Some(password) => password,
                None => read_password()?,
            };
            if controller.login(&username, &password).await {
                println!("{}", describe(&controller.state()));
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("login failed");
                Ok(ExitCode::from(1))
            }
        }
        Command::Status { path } => {
            let state = controller.state();
            println!("{}", describe(&state));
            if let Some(path) = path {
                println!("{} -> {:?}", path, resolve_path(&path, &state));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Logout => {
            controller.logout().await;
            println!("{}", describe(&controller.state()));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let mut args: Vec<String> = env::args().collect();
    let program = if args.is_empty() {
        "quickbus-auth".to_string()
    } else {
        args.remove(0)
    };

    let Some(command) = parse_args(&args) else {
        print_usage(&program);
        return ExitCode::from(2);
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(command)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
