use crate::traits::RandomSource;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Dawn,
    Morning,
    Afternoon,
    Dusk,
    Twilight,
    Evening,
    Night,
}

impl TimeOfDay {
    pub const ALL: [TimeOfDay; 7] = [
        TimeOfDay::Dawn,
        TimeOfDay::Morning,
        TimeOfDay::Afternoon,
        TimeOfDay::Dusk,
        TimeOfDay::Twilight,
        TimeOfDay::Evening,
        TimeOfDay::Night,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Weather {
    #[serde(rename = "clear sky")]
    ClearSky,
    #[serde(rename = "overcast")]
    Overcast,
    #[serde(rename = "sunny")]
    Sunny,
    #[serde(rename = "foggy")]
    Foggy,
    #[serde(rename = "rain")]
    Rain,
    #[serde(rename = "thunderstorms")]
    Thunderstorms,
    #[serde(rename = "snowfall")]
    Snowfall,
    #[serde(rename = "strong wind")]
    StrongWind,
}

impl Weather {
    pub const ALL: [Weather; 8] = [
        Weather::ClearSky,
        Weather::Overcast,
        Weather::Sunny,
        Weather::Foggy,
        Weather::Rain,
        Weather::Thunderstorms,
        Weather::Snowfall,
        Weather::StrongWind,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Spring, Season::Summer, Season::Autumn, Season::Winter];
}

/// Random setting for the special asset's background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SceneOptions {
    pub time_of_day: TimeOfDay,
    pub weather: Weather,
    pub season: Season,
}

impl SceneOptions {
    pub fn random(random: &dyn RandomSource) -> Self {
        Self {
            time_of_day: TimeOfDay::ALL[random.pick(TimeOfDay::ALL.len())],
            weather: Weather::ALL[random.pick(Weather::ALL.len())],
            season: Season::ALL[random.pick(Season::ALL.len())],
        }
    }
}
