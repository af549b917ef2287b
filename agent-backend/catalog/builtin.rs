//! Built-in application profiles.

use super::{ActivityScript, ApplicationProfile, PrimitiveAction};

fn shell(command: &str) -> PrimitiveAction {
    PrimitiveAction::shell(command)
}

fn typed(text: &str) -> PrimitiveAction {
    PrimitiveAction::type_text(text)
}

fn pause(secs: f64) -> PrimitiveAction {
    PrimitiveAction::sleep_secs(secs)
}

fn script(description: &str, steps: Vec<PrimitiveAction>) -> ActivityScript {
    ActivityScript {
        description: description.to_string(),
        steps,
    }
}

fn profile(name: &str, open: &str, close: &str, activities: Vec<ActivityScript>) -> ApplicationProfile {
    ApplicationProfile {
        name: name.to_string(),
        open_command: open.to_string(),
        close_command: close.to_string(),
        activities,
    }
}

pub fn profiles() -> Vec<ApplicationProfile> {
    vec![
        profile(
            "Visual Studio Code",
            "setsid -f code >/dev/null 2>&1",
            "pkill -f code",
            vec![
                script(
                    "Opening a file",
                    vec![shell("xdotool key ctrl+o"), pause(2.0), typed("main.py"), shell("xdotool key Return")],
                ),
                script(
                    "Typing code",
                    vec![
                        typed("print(\"Hello World\")"),
                        shell("xdotool key Return"),
                        shell("xdotool key ctrl+s"),
                    ],
                ),
                script(
                    "Search in files",
                    vec![
                        shell("xdotool key ctrl+shift+f"),
                        pause(1.0),
                        typed("function"),
                        shell("xdotool key Return"),
                    ],
                ),
            ],
        ),
        profile(
            "Slack",
            "setsid -f slack >/dev/null 2>&1",
            "pkill -f slack",
            vec![
                script(
                    "Checking messages",
                    vec![shell("xdotool key ctrl+k"), pause(1.0), typed("general"), shell("xdotool key Return")],
                ),
                script(
                    "Typing message",
                    vec![typed("Good morning team!"), shell("xdotool key Return")],
                ),
            ],
        ),
        profile(
            "Google Chrome",
            "setsid -f google-chrome >/dev/null 2>&1",
            "pkill -f chrome",
            vec![
                script(
                    "Browsing documentation",
                    vec![
                        shell("xdotool key ctrl+l"),
                        typed("https://docs.python.org"),
                        shell("xdotool key Return"),
                        pause(5.0),
                        shell("xdotool key ctrl+f"),
                        typed("function"),
                    ],
                ),
                script(
                    "Opening new tab",
                    vec![
                        shell("xdotool key ctrl+t"),
                        typed("https://stackoverflow.com"),
                        shell("xdotool key Return"),
                    ],
                ),
                script(
                    "Scrolling page",
                    vec![
                        shell("xdotool key Page_Down"),
                        pause(2.0),
                        shell("xdotool key Page_Down"),
                        pause(2.0),
                        shell("xdotool key Page_Up"),
                    ],
                ),
            ],
        ),
        profile(
            "Docker Desktop",
            "setsid -f docker >/dev/null 2>&1",
            "pkill -f docker",
            vec![
                script(
                    "Checking containers",
                    vec![shell("docker ps"), pause(2.0), shell("docker images")],
                ),
                script(
                    "Building image",
                    vec![shell("docker build -t test-app ."), pause(10.0)],
                ),
            ],
        ),
        profile(
            "Firefox",
            "setsid -f firefox >/dev/null 2>&1",
            "pkill -f firefox",
            vec![script(
                "Browsing web",
                vec![
                    shell("xdotool key ctrl+l"),
                    typed("https://github.com"),
                    shell("xdotool key Return"),
                ],
            )],
        ),
    ]
}
