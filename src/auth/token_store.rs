use keyring::Entry;

const SERVICE: &str = "prlink";

pub fn save_token(provider: &str, token: &str) -> Result<(), keyring::Error> {
    let entry = Entry::new(SERVICE, provider)?;
    entry.set_password(token)
}

pub fn load_token(provider: &str) -> Result<String, keyring::Error> {
    let entry = Entry::new(SERVICE, provider)?;
    entry.get_password()
}

pub fn delete_token(provider: &str) -> Result<(), keyring::Error> {
    let entry = Entry::new(SERVICE, provider)?;
    entry.delete_password()
}
