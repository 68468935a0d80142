//! `--help` output: the top-level command index and per-subcommand blocks.

pub fn print_version() {
    println!("spel {}", env!("CARGO_PKG_VERSION"));
}

pub fn print_help() {
    println!(
        r#"spel - browser automation with a persistent session daemon

Usage: spel [global flags] <command> [args]

Navigation:
  open <url>                     Navigate (aliases: goto, navigate)
  back | forward | reload        History and reload
  url | title | html             Current page basics

Inspection:
  snapshot [-i] [-C] [-c] [-d N] [-s SEL]
                                 Accessibility tree with @eN refs
  annotate [--no-boxes] [-D]     Draw ref overlays on the page
  unannotate                     Remove overlays
  screenshot [path] [-f] [-s SEL]
  pdf [path]
  get <text|html|value|attr|count|box|url|title> ...
  is <visible|enabled|checked> <sel>

Interaction (selectors accept @eN refs and CSS):
  click | dblclick | hover | focus | check | uncheck | clear <sel>
  fill <sel> <value>    type <sel> <text>
  press <key> [sel]     keydown/keyup <key>
  select <sel> <value>  drag <src> <tgt>   upload <sel> <file>...
  scroll [dir] [amount] [sel]   scrollintoview <sel>   highlight <sel>
  mouse <move x y|down|up|wheel>
  find <role|text|label|placeholder|alt|title|testid|first|last|nth> <value>
       [action] [value] [--name N] [--exact]

Waiting:
  wait <sel|ms> | --text T | --url U | --fn JS | --state S [--timeout MS]

Environment:
  tab [new [url]|list|close [i]|<i>]
  frame <name>|main|list
  set <viewport|device|geo|offline|headers|media|credentials> ...
  cookies [get|set <n> <v>|clear]
  storage <local|session> [get [k]|set <k> <v>|clear]
  network <route|unroute|requests|clear> ...
  dialog <accept [text]|dismiss>

Diagnostics:
  console [clear|start]          Captured console messages
  errors [clear|start]           Captured page errors
  trace <start|stop [path]>      Browser trace recording
  eval <script> [--encode]       Run JavaScript in the page

Sessions & state:
  session [list|info]            Session daemons
  state <save|load|list|show|rename|clear|clean> ...
  connect <endpoint>             Attach to a browser over CDP
  close                          Shut the session daemon down

Global flags:
  --session NAME   --json   --interactive   --timeout MS   --debug
  --profile DIR    --cdp EP   --executable-path P   --args A
  --user-agent UA  --proxy P  --proxy-bypass B  --ignore-https-errors
  --headers JSON   --session-name NAME  --max-output N  --content-boundaries

Environment variables: SPEL_SESSION, SPEL_JSON, SPEL_PROFILE, SPEL_HEADERS,
SPEL_EXECUTABLE_PATH, SPEL_USER_AGENT, SPEL_PROXY, SPEL_PROXY_BYPASS,
SPEL_IGNORE_HTTPS_ERRORS, SPEL_DEBUG, SPEL_CDP, SPEL_ARGS, SPEL_TIMEOUT"#
    );
}

/// Per-subcommand help. Returns false when the command has no block so the
/// caller falls back to the index.
pub fn print_command_help(command: &str) -> bool {
    let block = match command {
        "open" | "goto" | "navigate" => {
            "Usage: spel open <url>\n\nNavigates the active tab. URLs without a scheme get https://.\nResponds with the final URL, title, and a fresh snapshot."
        }
        "snapshot" => {
            "Usage: spel snapshot [-i] [-C] [-c] [-d N] [-s SEL]\n\n  -i, --interactive   only elements with refs that accept input\n  -C, --cursor        extend -i with pointer-cursor elements\n  -c, --compact       drop bare structural lines\n  -d, --depth N       limit tree depth\n  -s, --selector SEL  scope the walk to a subtree"
        }
        "click" => "Usage: spel click <selector>\n\nSelectors accept @eN refs from the last snapshot, or CSS.",
        "fill" => "Usage: spel fill <selector> <value>\n\nClears the field, then inserts the value with input events.",
        "find" => {
            "Usage: spel find <kind> <value> [action] [value] [--name N] [--exact]\n\nKinds: role text label placeholder alt title testid first last nth\nActions: click fill type check uncheck hover focus text count visible\n--name matches the accessible name exactly or as a case-insensitive regex."
        }
        "wait" => {
            "Usage: spel wait <selector|ms>\n       spel wait --text T | --url GLOB | --fn JS | --state load|domcontentloaded|networkidle\n\n  --timeout MS   cap for this wait (defaults to the session timeout)"
        }
        "screenshot" => {
            "Usage: spel screenshot [path] [-f] [-s SEL]\n\n  -f, --full      capture the full scrollable page\n  -s, --selector  capture one element\nWithout a path the image lands in the temp directory."
        }
        "network" => {
            "Usage: spel network route <pattern> [--abort | --body B [--status N] [--content-type T]]\n       spel network unroute [pattern]\n       spel network requests [--filter F] [--type T] [--method M] [--status S]\n       spel network clear\n\nPatterns use * within a path segment and ** across segments."
        }
        "state" => {
            "Usage: spel state save|load [name]\n       spel state list | show <name> | rename <old> <new>\n       spel state clear [name] | clean [--days N]\n\nSaved storage-state (cookies + localStorage) lives next to the session sockets."
        }
        "set" => {
            "Usage: spel set viewport <w> <h>\n       spel set device <name>          (recreates the context)\n       spel set geo <lat> <lng>\n       spel set offline [on|off]\n       spel set headers <json>\n       spel set media [dark|light] [reduced-motion]\n       spel set credentials <user> <pass>  (recreates the context)"
        }
        "session" => {
            "Usage: spel session          print the current session name\n       spel session list     live session daemons\n       spel session info     daemon state for this session"
        }
        _ => return false,
    };
    println!("{}", block);
    true
}
